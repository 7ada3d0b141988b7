pub mod core;
pub mod expander;
pub mod loader;
pub mod optimizer;
pub mod splitter;
pub mod validator;
