use crate::dsl::{Parameter, PipelineJobSpec};
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Arena index of a [`JobNode`] inside a graph. Stable for the lifetime of
/// the graph, even when other nodes are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

/// A vertex of the compiled graph.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub(crate) node_id: String,
    pub(crate) spec: PipelineJobSpec,
    /// Node-local values; take precedence over the spec's configuration.
    pub(crate) configuration: BTreeMap<String, Value>,
    pub(crate) is_split_node: bool,
    pub(crate) resolved: Option<BTreeMap<String, Value>>,
}

impl JobNode {
    pub fn new(spec: PipelineJobSpec) -> Self {
        Self {
            node_id: spec.id.clone(),
            spec,
            configuration: BTreeMap::new(),
            is_split_node: false,
            resolved: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn spec(&self) -> &PipelineJobSpec {
        &self.spec
    }

    pub fn is_split_node(&self) -> bool {
        self.is_split_node
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.spec.parameter(name)
    }

    /// Raw value for `name`: node override, then spec configuration, then the
    /// parameter's default.
    pub fn configured(&self, name: &str) -> Option<&Value> {
        self.configuration
            .get(name)
            .or_else(|| self.spec.configuration.get(name))
            .or_else(|| self.parameter(name).and_then(|p| p.default_value.as_ref()))
    }

    /// Value as written in the job spec, before any edge rewrote it.
    pub fn declared(&self, name: &str) -> Option<&Value> {
        self.spec
            .configuration
            .get(name)
            .or_else(|| self.parameter(name).and_then(|p| p.default_value.as_ref()))
    }

    /// Every key this node carries a raw value for, parameters first in
    /// declaration order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.spec.parameters.iter().map(|p| p.name.clone()).collect();
        for key in self.spec.configuration.keys().chain(self.configuration.keys()) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Raw configuration with node overrides applied.
    pub fn raw_configuration(&self) -> BTreeMap<String, Value> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.configured(&k).cloned().map(|v| (k, v)))
            .collect()
    }

    /// Fully resolved configuration, available once the graph is prepared.
    pub fn resolved_configuration(&self) -> Option<&BTreeMap<String, Value>> {
        self.resolved.as_ref()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.configuration.insert(name.to_string(), value);
        self.resolved = None;
    }
}
