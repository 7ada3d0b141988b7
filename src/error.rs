use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal compilation failures. Any of these aborts graph construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // definition
    #[error("invalid pipeline: {}", join_messages(.0))]
    InvalidPipeline(Vec<ValidationError>),
    #[error("job '{job}' runs after unknown job '{after}'")]
    UnknownJob { job: String, after: String },
    #[error("scope '{0}' holds a value and cannot have children")]
    ScopeHasValue(String),
    #[error("scope '{0}' has children and cannot hold a value")]
    ScopeHasChildren(String),
    #[error("scope '{parent}' already has a child named '{name}'")]
    DuplicateScope { parent: String, name: String },

    // resolution
    #[error("unresolved reference ${{{0}}}")]
    UnresolvedReference(String),
    #[error("self-referencing variable ${{{0}}}")]
    SelfReference(String),
    #[error("cannot broadcast template '{template}': lists of length {left} and {right}")]
    BroadcastMismatch { template: String, left: usize, right: usize },
    #[error("unknown file field '{field}' in ${{{reference}}}")]
    UnknownFileField { reference: String, field: String },
    #[error("'{0}' is not a single variable reference")]
    NotSingleReference(String),
    #[error("${{{0}}} does not name a value")]
    NotAValue(String),

    // cardinality
    #[error("parameter '{parameter}' of job '{job}' has {found} values, expected {expected}")]
    CardinalityMismatch {
        job: String,
        parameter: String,
        expected: usize,
        found: usize,
    },
    #[error("job '{0}' mixes parallel and serial expansion")]
    MixedExpansion(String),
    #[error("many-to-one edge into '{job}.{parameter}' survived node splitting")]
    UnsplitManyToOne { job: String, parameter: String },
    #[error("dependency cycle detected between jobs: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Findings of the structural and semantic validation passes.
///
/// These are returned to the caller rather than raised, so a graph can be
/// built and inspected even when some parameters are still unset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job at position {index} has an empty id")]
    EmptyJobId { index: usize },
    #[error("duplicate job id '{0}'")]
    DuplicateJobId(String),
    #[error("job '{job}' runs after unknown job '{after}'")]
    UnknownAfter { job: String, after: String },
    #[error("pipeline parameter '{parameter}' is mandatory but not set")]
    MissingPipelineParameter { parameter: String },
    #[error("job '{job}': parameter '{parameter}' is mandatory but not set")]
    MissingParameter { job: String, parameter: String },
    #[error("job '{job}': parameter '{parameter}' cannot be resolved: {reason}")]
    UnresolvedParameter {
        job: String,
        parameter: String,
        reason: String,
    },
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
