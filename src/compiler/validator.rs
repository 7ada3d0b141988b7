use crate::dsl::Pipeline;
use crate::error::ValidationError;
use crate::graph::{NodeId, PipelineGraph};
use crate::value::Value;
use std::collections::HashSet;

/// Structural checks on a pipeline definition: ids present, unique within
/// their pipeline, and `after` naming known jobs. Nested pipelines are
/// checked as well.
pub fn validate_structure(pipeline: &Pipeline) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, spec) in pipeline.job_specs.iter().enumerate() {
        if spec.id.is_empty() {
            errors.push(ValidationError::EmptyJobId { index });
        } else if !seen.insert(spec.id.as_str()) {
            errors.push(ValidationError::DuplicateJobId(spec.id.clone()));
        }
    }

    for spec in &pipeline.job_specs {
        for after in &spec.after {
            if pipeline.job(after).is_none() {
                errors.push(ValidationError::UnknownAfter {
                    job: spec.id.clone(),
                    after: after.clone(),
                });
            }
        }
        if let Some(nested) = &spec.nested_pipeline {
            errors.extend(validate_structure(nested));
        }
    }
    errors
}

fn is_unset(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_empty_list)
}

/// Mandatory-parameter checks on a built graph.
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Collects every unset mandatory parameter, pipeline-level first, then
    /// per node in execution order and parameter declaration order.
    pub fn validate(&self, graph: &mut PipelineGraph) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let root = graph.scope.root();
        for parameter in graph.pipeline.parameters.clone() {
            if !parameter.is_mandatory {
                continue;
            }
            let raw = graph
                .pipeline
                .configuration
                .get(&parameter.name)
                .or(parameter.default_value.as_ref())
                .cloned();
            let value = match raw {
                Some(v) => graph.scope.resolve(root, &v).ok(),
                None => None,
            };
            if is_unset(value.as_ref()) {
                errors.push(ValidationError::MissingPipelineParameter {
                    parameter: parameter.name.clone(),
                });
            }
        }

        let order: Vec<NodeId> = graph
            .topological_order()
            .unwrap_or_else(|_| graph.nodes.keys().copied().collect());
        for id in order {
            let node = &graph.nodes[&id];
            let job = node.node_id.clone();
            let mandatory: Vec<_> = node
                .spec
                .parameters
                .iter()
                .filter(|p| p.is_mandatory)
                .cloned()
                .collect();
            let cached = node.resolved.clone();

            for parameter in mandatory {
                let value = match cached.as_ref().map(|r| r.get(&parameter.name).cloned()) {
                    Some(v) => v,
                    None => match graph.property_value(id, &parameter.name) {
                        Ok(v) => v,
                        Err(e) => {
                            errors.push(ValidationError::UnresolvedParameter {
                                job: job.clone(),
                                parameter: parameter.name.clone(),
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    },
                };
                let value = value.or_else(|| parameter.default_value.clone());
                if is_unset(value.as_ref()) {
                    errors.push(ValidationError::MissingParameter {
                        job: job.clone(),
                        parameter: parameter.name.clone(),
                    });
                }
            }
        }
        errors
    }
}
