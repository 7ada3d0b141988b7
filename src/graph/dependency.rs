use crate::error::Result;
use crate::graph::edge::{Cardinality, DataLink, JobEdge};
use crate::graph::node::NodeId;
use crate::graph::PipelineGraph;
use crate::scope::{ScopeId, template};
use crate::value::Value;
use std::collections::HashSet;
use tracing::debug;

fn reference_paths(value: &Value, out: &mut Vec<Vec<String>>) {
    match value {
        Value::Str(s) => out.extend(template::references(s)),
        Value::List(items) => items.iter().for_each(|v| reference_paths(v, out)),
        _ => {}
    }
}

impl PipelineGraph {
    /// Infers data edges into `target` from the `${job.output}` references in
    /// its parameter values.
    pub(crate) fn find_dependencies(&mut self, target: NodeId) -> Result<()> {
        let Some(target_scope) = self.scope_of(target) else {
            return Ok(());
        };
        let parameters = self.nodes[&target].spec.parameters.clone();

        let mut found = Vec::new();
        for parameter in &parameters {
            if self.scope.child(target_scope, &parameter.name).is_none() {
                continue;
            }
            let Some(raw) = self.nodes[&target].configured(&parameter.name) else {
                continue;
            };
            if !raw.contains_reference() {
                continue;
            }
            let mut paths = Vec::new();
            reference_paths(raw, &mut paths);

            let mut seen: HashSet<(NodeId, String)> = HashSet::new();
            for path in paths {
                let Some((leaf, _)) = self.scope.lookup(target_scope, &path) else {
                    continue;
                };
                let Some((source, property, output_scope)) = self.output_owner(leaf) else {
                    continue;
                };
                if source == target || !seen.insert((source, property.clone())) {
                    continue;
                }
                let source_is_list = self.nodes[&source]
                    .parameter(&property)
                    .is_some_and(|p| p.is_list);
                let value = self.scope.resolve_at(output_scope)?;
                found.push(JobEdge::data(
                    source,
                    target,
                    DataLink {
                        cardinality: Cardinality::between(source_is_list, parameter.is_list),
                        source_property: property,
                        target_property: parameter.name.clone(),
                        value,
                        split_index: None,
                    },
                ));
            }
        }

        for edge in found {
            debug!(
                source = %self.nodes[&edge.source].node_id,
                target = %self.nodes[&edge.target].node_id,
                cardinality = ?edge.cardinality(),
                "Inferred dependency"
            );
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Maps a scope node inside a job's subtree to that job and the output
    /// parameter it belongs to.
    fn output_owner(&self, leaf: ScopeId) -> Option<(NodeId, String, ScopeId)> {
        let path = self.scope.path_of(leaf);
        if path.len() < 2 {
            return None;
        }
        let source = self.find(&path[0])?;
        let parameter = self.nodes[&source].parameter(&path[1])?;
        if !parameter.is_output {
            return None;
        }
        let job_scope = self.scope.child(self.scope.root(), &path[0])?;
        let output_scope = self.scope.child(job_scope, &path[1])?;
        Some((source, path[1].clone(), output_scope))
    }
}
