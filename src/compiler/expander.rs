use crate::error::Result;
use crate::graph::{JobEdge, NodeId, PipelineGraph};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Replaces jobs that carry a nested pipeline with that pipeline's compiled
/// nodes.
pub struct Expander;

impl Expander {
    pub fn new() -> Self {
        Self
    }

    pub fn expand(&self, graph: &mut PipelineGraph) -> Result<()> {
        let nested: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|(_, n)| n.spec.nested_pipeline.is_some())
            .map(|(id, _)| *id)
            .collect();

        for id in nested {
            self.expand_node(graph, id)?;
        }
        Ok(())
    }

    fn expand_node(&self, graph: &mut PipelineGraph, id: NodeId) -> Result<()> {
        let parent_id = graph.nodes[&id].node_id.clone();
        let Some(mut pipeline) = graph.nodes[&id].spec.nested_pipeline.as_deref().cloned() else {
            return Ok(());
        };

        // 1. Compile the sub-pipeline with the parent's values layered on top
        for (key, value) in graph.configuration(&parent_id)? {
            pipeline.configuration.insert(key, value);
        }
        let mut sub = PipelineGraph::new(&pipeline)?;
        sub.prepare()?;

        // 2. Move sub-nodes over under prefixed ids. Their values are already
        // resolved against the sub-pipeline's scope.
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        for (sub_id, node) in &sub.nodes {
            let mut node = node.clone();
            node.node_id = format!("{}_{}", parent_id, node.node_id);
            if let Some(resolved) = node.resolved.take() {
                node.configuration = resolved;
            }
            mapping.insert(*sub_id, graph.add_node(node)?);
        }

        let mut edges: Vec<JobEdge> = sub
            .edges
            .iter()
            .map(|edge| {
                let mut edge = edge.clone();
                edge.source = mapping[&edge.source];
                edge.target = mapping[&edge.target];
                edge
            })
            .collect();

        // 3. Entry and exit points
        let has_incoming: HashSet<NodeId> = edges.iter().map(|e| e.target).collect();
        let has_outgoing: HashSet<NodeId> = edges.iter().map(|e| e.source).collect();
        let mut inner: Vec<NodeId> = mapping.values().copied().collect();
        inner.sort();
        let roots: Vec<NodeId> = inner.iter().copied().filter(|n| !has_incoming.contains(n)).collect();
        let leaves: Vec<NodeId> = inner.iter().copied().filter(|n| !has_outgoing.contains(n)).collect();

        // 4. Reconnect the placeholder's neighbours
        let mut linked: HashSet<(NodeId, NodeId)> = HashSet::new();
        for index in graph.incoming(id) {
            let source = graph.edges[index].source;
            for &root in &roots {
                if linked.insert((source, root)) {
                    edges.push(JobEdge::after(source, root));
                }
            }
        }
        for index in graph.outgoing(id) {
            let target = graph.edges[index].target;
            for &leaf in &leaves {
                if linked.insert((leaf, target)) {
                    edges.push(JobEdge::after(leaf, target));
                }
            }
        }

        graph.remove_node(id);
        graph.edges.extend(edges);
        info!(node = %parent_id, inner = inner.len(), "Expanded nested pipeline");
        Ok(())
    }
}
