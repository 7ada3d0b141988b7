pub mod compiler;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod scope;
pub mod value;

pub use compiler::core::{CompiledPipeline, Compiler, CompilerOptions};
pub use error::{Error, Result, ValidationError};
pub use graph::PipelineGraph;
pub use value::Value;
