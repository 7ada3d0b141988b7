//! The compiled job graph.
//!
//! A [`PipelineGraph`] owns a copy of the pipeline, an arena of [`JobNode`]s,
//! the [`JobEdge`]s between them and the scope tree every `${...}` reference
//! resolves against. It is built by [`PipelineGraph::new`], then mutated in
//! place by [`PipelineGraph::prepare`] and [`PipelineGraph::reduce_dependencies`].

pub mod dependency;
pub mod edge;
pub mod node;

pub use edge::{Cardinality, DataLink, EdgeKind, JobEdge};
pub use node::{JobNode, NodeId};

use crate::compiler::core::CompilerOptions;
use crate::compiler::expander::Expander;
use crate::compiler::optimizer::Optimizer;
use crate::compiler::splitter::Splitter;
use crate::compiler::validator::{self, Validator};
use crate::dsl::Pipeline;
use crate::error::{Error, Result, ValidationError};
use crate::scope::{ScopeId, ScopeTree};
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

#[derive(Debug)]
pub struct PipelineGraph {
    pub(crate) pipeline: Pipeline,
    pub(crate) nodes: BTreeMap<NodeId, JobNode>,
    pub(crate) edges: Vec<JobEdge>,
    pub(crate) scope: ScopeTree,
    next_id: usize,
}

/// Serializable snapshot handed to executors and printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<EdgeSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub tool_id: String,
    pub split: bool,
    pub configuration: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSummary {
    pub source: String,
    pub target: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
}

impl PipelineGraph {
    /// Builds one node per job spec and infers the initial edges.
    ///
    /// The pipeline is copied; the caller's value is never touched.
    pub fn new(pipeline: &Pipeline) -> Result<Self> {
        let errors = validator::validate_structure(pipeline);
        if !errors.is_empty() {
            return Err(Error::InvalidPipeline(errors));
        }

        let mut graph = Self {
            pipeline: pipeline.clone(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            scope: ScopeTree::new(),
            next_id: 0,
        };

        // 1. Global scope
        let root = graph.scope.root();
        for (key, value) in &pipeline.configuration {
            graph.scope.put(root, key, value.clone())?;
        }
        for parameter in &pipeline.parameters {
            if pipeline.configuration.contains_key(&parameter.name) {
                continue;
            }
            if let Some(default) = &parameter.default_value {
                graph.scope.put(root, &parameter.name, default.clone())?;
            }
        }

        // 2. Vertices
        let mut ids = Vec::with_capacity(pipeline.job_specs.len());
        for spec in &pipeline.job_specs {
            ids.push(graph.add_node(JobNode::new(spec.clone()))?);
        }

        // 3. Manual ordering
        for (spec, &target) in pipeline.job_specs.iter().zip(&ids) {
            for after in &spec.after {
                let source = graph.find(after).ok_or_else(|| Error::UnknownJob {
                    job: spec.id.clone(),
                    after: after.clone(),
                })?;
                graph.edges.push(JobEdge::after(source, target));
            }
        }

        // 4. Data dependencies
        for &id in &ids {
            graph.find_dependencies(id)?;
        }

        info!(nodes = graph.nodes.len(), edges = graph.edges.len(), "Built pipeline graph");
        Ok(graph)
    }

    /// Splits, configures and expands nested pipelines.
    pub fn prepare(&mut self) -> Result<()> {
        self.prepare_with(&CompilerOptions::default())
    }

    pub fn prepare_with(&mut self, options: &CompilerOptions) -> Result<()> {
        Splitter::new().split(self)?;
        self.configure()?;
        if options.expand_nested {
            Expander::new().expand(self)?;
        }
        self.finalize()?;
        info!(nodes = self.nodes.len(), edges = self.edges.len(), "Prepared pipeline graph");
        Ok(())
    }

    /// Removes edges already implied by longer paths. Returns how many went.
    pub fn reduce_dependencies(&mut self) -> Result<usize> {
        Optimizer::new().reduce(self)
    }

    /// Mandatory-parameter check over the pipeline and every node.
    pub fn validate(&mut self) -> Vec<ValidationError> {
        Validator::new().validate(self)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn scope(&self) -> &ScopeTree {
        &self.scope
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &JobNode> {
        self.nodes.values()
    }

    pub fn node(&self, node_id: &str) -> Option<&JobNode> {
        self.find(node_id).map(|id| &self.nodes[&id])
    }

    pub fn get(&self, id: NodeId) -> Option<&JobNode> {
        self.nodes.get(&id)
    }

    pub fn find(&self, node_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.node_id == node_id)
            .map(|(id, _)| *id)
    }

    pub fn edges(&self) -> &[JobEdge] {
        &self.edges
    }

    pub fn edge_endpoints(&self, edge: &JobEdge) -> (&str, &str) {
        (
            self.nodes[&edge.source].node_id(),
            self.nodes[&edge.target].node_id(),
        )
    }

    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&JobEdge> {
        match (self.find(source), self.find(target)) {
            (Some(s), Some(t)) => self
                .edges
                .iter()
                .filter(|e| e.source == s && e.target == t)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn in_degree(&self, node_id: &str) -> usize {
        self.find(node_id)
            .map_or(0, |id| self.edges.iter().filter(|e| e.target == id).count())
    }

    pub fn out_degree(&self, node_id: &str) -> usize {
        self.find(node_id)
            .map_or(0, |id| self.edges.iter().filter(|e| e.source == id).count())
    }

    pub(crate) fn incoming(&self, id: NodeId) -> Vec<usize> {
        (0..self.edges.len()).filter(|&i| self.edges[i].target == id).collect()
    }

    pub(crate) fn outgoing(&self, id: NodeId) -> Vec<usize> {
        (0..self.edges.len()).filter(|&i| self.edges[i].source == id).collect()
    }

    /// Node ids ordered so that every edge points forward. Ties keep
    /// insertion order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in &self.edges {
            *in_degree.entry(edge.target).or_default() += 1;
            successors.entry(edge.source).or_default().push(edge.target);
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in successors.get(&id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let mut stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| self.nodes[id].node_id.clone())
                .collect();
            stuck.sort();
            return Err(Error::Cycle(stuck));
        }
        Ok(order)
    }

    /// Nodes in execution order.
    pub fn ordered_nodes(&self) -> Result<Vec<&JobNode>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|id| &self.nodes[&id])
            .collect())
    }

    /// Resolved configuration of `node_id`.
    pub fn configuration(&mut self, node_id: &str) -> Result<BTreeMap<String, Value>> {
        let id = self
            .find(node_id)
            .ok_or_else(|| Error::UnresolvedReference(node_id.to_string()))?;
        if let Some(resolved) = &self.nodes[&id].resolved {
            return Ok(resolved.clone());
        }
        self.resolve_configuration(id)
    }

    pub fn to_summary(&mut self) -> Result<GraphSummary> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for id in self.topological_order()? {
            let configuration = match self.nodes[&id].resolved.clone() {
                Some(resolved) => resolved,
                None => self.resolve_configuration(id)?,
            };
            let node = &self.nodes[&id];
            nodes.push(NodeSummary {
                id: node.node_id.clone(),
                tool_id: node.spec.tool_id.clone(),
                split: node.is_split_node,
                configuration,
            });
        }
        let edges = self
            .edges
            .iter()
            .map(|edge| {
                let (source, target) = self.edge_endpoints(edge);
                let (kind, source_property, target_property) = match edge.link() {
                    Some(link) => (
                        format!("{:?}", link.cardinality),
                        Some(link.source_property.clone()),
                        Some(link.target_property.clone()),
                    ),
                    None => ("After".to_string(), None, None),
                };
                EdgeSummary {
                    source: source.to_string(),
                    target: target.to_string(),
                    kind,
                    source_property,
                    target_property,
                }
            })
            .collect();
        Ok(GraphSummary { nodes, edges })
    }

    // --- construction helpers used by the passes ---

    /// Inserts `node` and mirrors its configuration into a child scope.
    pub(crate) fn add_node(&mut self, node: JobNode) -> Result<NodeId> {
        let root = self.scope.root();
        let scope = self.scope.create_child(root, &node.node_id)?;
        for (key, value) in node.raw_configuration() {
            self.scope.put(scope, &key, value)?;
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        debug!(node = %node.node_id, "Added node");
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Drops the node and every edge touching it. Its scope stays in place so
    /// references written against the original job keep resolving.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<JobNode> {
        self.edges.retain(|e| e.source != id && e.target != id);
        self.nodes.remove(&id)
    }

    pub(crate) fn scope_of(&self, id: NodeId) -> Option<ScopeId> {
        let node = self.nodes.get(&id)?;
        self.scope.child(self.scope.root(), &node.node_id)
    }

    /// Sets a node-local value and keeps the node's scope in sync.
    pub(crate) fn set_node_value(&mut self, id: NodeId, key: &str, value: Value) -> Result<()> {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set(key, value.clone());
        }
        if let Some(scope) = self.scope_of(id) {
            self.scope.put(scope, key, value)?;
        }
        Ok(())
    }

    /// Resolved value of `key` on node `id`, `None` if the node has no value.
    pub(crate) fn property_value(&mut self, id: NodeId, key: &str) -> Result<Option<Value>> {
        let Some(scope) = self.scope_of(id) else {
            return Ok(None);
        };
        match self.scope.child(scope, key) {
            Some(leaf) if self.scope.node(leaf).value().is_some() => self.scope.resolve_at(leaf).map(Some),
            _ => Ok(None),
        }
    }

    fn resolve_configuration(&mut self, id: NodeId) -> Result<BTreeMap<String, Value>> {
        let mut resolved = BTreeMap::new();
        for key in self.nodes[&id].keys() {
            if let Some(value) = self.property_value(id, &key)? {
                resolved.insert(key, value);
            }
        }
        Ok(resolved)
    }

    /// Applies every data edge, upstream targets first.
    pub(crate) fn configure(&mut self) -> Result<()> {
        let position: HashMap<NodeId, usize> = self
            .topological_order()?
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        let mut indices: Vec<usize> = (0..self.edges.len()).collect();
        indices.sort_by_key(|&i| position.get(&self.edges[i].target).copied().unwrap_or(usize::MAX));
        for index in indices {
            self.apply_edge(index)?;
        }
        Ok(())
    }

    /// Stores the resolved configuration on every node.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let resolved = self.resolve_configuration(id)?;
            if let Some(node) = self.nodes.get_mut(&id) {
                node.resolved = Some(resolved);
            }
        }
        Ok(())
    }
}
