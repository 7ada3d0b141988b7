use crate::error::Result;
use crate::graph::{NodeId, PipelineGraph};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Transitive reduction of the dependency edges.
///
/// An edge `u -> v` is dropped when `v` is also reachable from `u` through
/// another successor, and parallel edges between the same pair collapse to
/// the first one. Running it again removes nothing.
pub struct Optimizer;

impl Optimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn reduce(&self, graph: &mut PipelineGraph) -> Result<usize> {
        let order = graph.topological_order()?;

        // 1. Successor sets
        let mut successors: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for edge in graph.edges() {
            successors.entry(edge.source()).or_default().insert(edge.target());
        }

        // 2. Reachability, sinks first
        let mut reachable: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for id in order.iter().rev() {
            let mut reach = HashSet::new();
            for next in successors.get(id).into_iter().flatten() {
                reach.insert(*next);
                if let Some(further) = reachable.get(next) {
                    reach.extend(further.iter().copied());
                }
            }
            reachable.insert(*id, reach);
        }

        // 3. Keep direct edges only
        let mut kept_pairs: HashSet<(NodeId, NodeId)> = HashSet::new();
        let keep: Vec<bool> = graph
            .edges()
            .iter()
            .map(|edge| {
                let (u, v) = (edge.source(), edge.target());
                let implied = successors.get(&u).into_iter().flatten().any(|w| {
                    *w != v && reachable.get(w).is_some_and(|reach| reach.contains(&v))
                });
                !implied && kept_pairs.insert((u, v))
            })
            .collect();

        let before = graph.edges.len();
        let mut flags = keep.into_iter();
        graph.edges.retain(|edge| {
            let kept = flags.next().unwrap_or(true);
            if !kept {
                debug!(source = ?edge.source(), target = ?edge.target(), "Dropped redundant edge");
            }
            kept
        });

        let removed = before - graph.edges.len();
        info!(removed, remaining = graph.edges.len(), "Reduced dependencies");
        Ok(removed)
    }
}
