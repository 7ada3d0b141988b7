use crate::dsl::Pipeline;
use crate::error::{Result, ValidationError};
use crate::graph::PipelineGraph;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which compilation stages run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub reduce_dependencies: bool,
    pub expand_nested: bool,
    pub validate: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            reduce_dependencies: true,
            expand_nested: true,
            validate: true,
        }
    }
}

/// A finished graph plus the validation findings the caller decides on.
#[derive(Debug)]
pub struct CompiledPipeline {
    pub graph: PipelineGraph,
    pub validation_errors: Vec<ValidationError>,
}

impl CompiledPipeline {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn compile(&self, pipeline: &Pipeline) -> Result<CompiledPipeline> {
        // 1. Build vertices, scopes and inferred edges
        let mut graph = PipelineGraph::new(pipeline)?;

        // 2. Split, configure, expand
        graph.prepare_with(&self.options)?;

        // 3. Drop implied edges
        if self.options.reduce_dependencies {
            graph.reduce_dependencies()?;
        }

        // 4. Validate
        let validation_errors = if self.options.validate {
            graph.validate()
        } else {
            Vec::new()
        };
        for error in &validation_errors {
            warn!(%error, "Validation failed");
        }

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            errors = validation_errors.len(),
            "Compiled pipeline"
        );
        Ok(CompiledPipeline {
            graph,
            validation_errors,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
