use crate::dsl::ExpandMode;
use crate::error::{Error, Result};
use crate::graph::{Cardinality, DataLink, EdgeKind, JobEdge, JobNode, NodeId, PipelineGraph};
use crate::scope::{file, template};
use crate::value::Value;
use std::collections::HashSet;
use tracing::{debug, info};

/// One value a replica receives from a many-to-one source.
struct Element {
    edge: usize,
    source: NodeId,
    source_property: String,
    index: usize,
    value: Value,
}

/// One-to-one edges into `property` from the replicas of one upstream output.
struct Multiplied {
    property: String,
    origin: String,
    source_property: String,
    edges: Vec<usize>,
}

/// Everything that forces a node to be replicated, grouped by property.
#[derive(Default)]
struct SplitPlan {
    many_to_one: Vec<(String, Vec<Element>)>,
    list_values: Vec<(String, Vec<Value>)>,
    one_to_one: Vec<Multiplied>,
    /// Incoming edges that are replaced per replica instead of re-linked.
    consumed: HashSet<usize>,
}

impl SplitPlan {
    /// The common element count of all sources, `None` when nothing drives a split.
    fn size(&self, job: &str) -> Result<Option<usize>> {
        let sizes = self
            .many_to_one
            .iter()
            .map(|(name, elements)| (name, elements.len()))
            .chain(self.list_values.iter().map(|(name, items)| (name, items.len())))
            .chain(self.one_to_one.iter().map(|group| (&group.property, group.edges.len())));

        let mut expected: Option<usize> = None;
        for (name, found) in sizes {
            match expected {
                Some(e) if e != found => {
                    return Err(Error::CardinalityMismatch {
                        job: job.to_string(),
                        parameter: name.clone(),
                        expected: e,
                        found,
                    });
                }
                _ => expected = Some(found),
            }
        }
        Ok(expected)
    }

    fn assigned(&self) -> HashSet<&str> {
        self.many_to_one
            .iter()
            .map(|(n, _)| n.as_str())
            .chain(self.list_values.iter().map(|(n, _)| n.as_str()))
            .chain(self.one_to_one.iter().map(|g| g.property.as_str()))
            .collect()
    }
}

/// Replicates nodes that receive more values than their parameters take.
pub struct Splitter;

impl Splitter {
    pub fn new() -> Self {
        Self
    }

    pub fn split(&self, graph: &mut PipelineGraph) -> Result<()> {
        let order = graph.topological_order()?;
        let mut split_count = 0;

        for id in order {
            let Some(node) = graph.get(id) else {
                continue;
            };
            let job = node.node_id().to_string();
            let plan = self.plan(graph, id)?;

            match plan.size(&job)? {
                None => {}
                Some(1) => self.collapse(graph, id, &plan)?,
                Some(n) => {
                    self.replicate(graph, id, &plan, n)?;
                    split_count += 1;
                }
            }
        }

        info!(split = split_count, nodes = graph.node_count(), "Split pass finished");
        Ok(())
    }

    fn plan(&self, graph: &mut PipelineGraph, id: NodeId) -> Result<SplitPlan> {
        let mut plan = SplitPlan::default();
        let mut covered = HashSet::new();

        for index in graph.incoming(id) {
            let edge = graph.edges[index].clone();
            let Some(link) = edge.link() else {
                continue;
            };
            covered.insert(link.target_property.clone());

            match link.cardinality {
                Cardinality::Many2One => {
                    let items = graph
                        .property_value(edge.source, &link.source_property)?
                        .unwrap_or_else(|| link.value.clone())
                        .into_list();
                    if items.is_empty() {
                        // nothing to hand over, keep the ordering only
                        graph.edges[index].kind = EdgeKind::After;
                        continue;
                    }
                    let elements = items.into_iter().enumerate().map(|(i, value)| Element {
                        edge: index,
                        source: edge.source,
                        source_property: link.source_property.clone(),
                        index: i,
                        value,
                    });
                    match plan.many_to_one.iter_mut().find(|(p, _)| *p == link.target_property) {
                        Some((_, list)) => list.extend(elements),
                        None => plan
                            .many_to_one
                            .push((link.target_property.clone(), elements.collect())),
                    }
                    plan.consumed.insert(index);
                }
                Cardinality::One2One => {
                    let origin = graph.nodes[&edge.source].spec().id.clone();
                    let group = plan.one_to_one.iter_mut().find(|g| {
                        g.property == link.target_property
                            && g.origin == origin
                            && g.source_property == link.source_property
                    });
                    match group {
                        Some(group) => group.edges.push(index),
                        None => plan.one_to_one.push(Multiplied {
                            property: link.target_property.clone(),
                            origin,
                            source_property: link.source_property.clone(),
                            edges: vec![index],
                        }),
                    }
                }
                Cardinality::One2Many | Cardinality::Many2Many => {}
            }
        }

        // a single edge per upstream output is plain data flow
        plan.one_to_one.retain(|group| group.edges.len() > 1);
        let multiplied: Vec<usize> = plan.one_to_one.iter().flat_map(|g| g.edges.iter().copied()).collect();
        plan.consumed.extend(multiplied);

        let parameters = graph.nodes[&id].spec.parameters.clone();
        for parameter in parameters.iter().filter(|p| !p.is_list && !covered.contains(&p.name)) {
            if let Some(Value::List(items)) = graph.property_value(id, &parameter.name)? {
                if !items.is_empty() {
                    plan.list_values.push((parameter.name.clone(), items));
                }
            }
        }
        Ok(plan)
    }

    /// A single element needs no replicas: rewrite in place.
    fn collapse(&self, graph: &mut PipelineGraph, id: NodeId, plan: &SplitPlan) -> Result<()> {
        for (_, elements) in &plan.many_to_one {
            for element in elements {
                if let EdgeKind::Data(link) = &mut graph.edges[element.edge].kind {
                    link.cardinality = Cardinality::One2One;
                    link.split_index = Some(element.index);
                    link.value = element.value.clone();
                }
            }
        }
        for (name, items) in &plan.list_values {
            graph.set_node_value(id, name, items[0].clone())?;
        }
        Ok(())
    }

    fn replicate(&self, graph: &mut PipelineGraph, id: NodeId, plan: &SplitPlan, n: usize) -> Result<()> {
        let original = graph.nodes[&id].clone();
        let serial = expansion_is_serial(&original)?;
        let infix = if serial { "seq" } else { "split" };

        // 1. Replicas, each holding its share of the values
        let mut replicas = Vec::with_capacity(n);
        for i in 0..n {
            let mut replica = original.clone();
            replica.node_id = format!("{}_{}_{}", original.node_id, infix, i);
            replica.is_split_node = true;
            replica.resolved = None;
            for (name, items) in &plan.list_values {
                replica.configuration.insert(name.clone(), items[i].clone());
            }
            for (name, elements) in &plan.many_to_one {
                replica.configuration.insert(name.clone(), elements[i].value.clone());
            }
            replicas.push(graph.add_node(replica)?);
        }

        // 2. Parallel replicas must not write the same output file
        self.separate_outputs(graph, &original, &replicas, plan)?;

        // 3. Edges
        let incoming = graph.incoming(id);
        let outgoing = graph.outgoing(id);
        let mut edges = Vec::new();
        for (i, &replica) in replicas.iter().enumerate() {
            for (name, elements) in &plan.many_to_one {
                let element = &elements[i];
                edges.push(JobEdge::data(
                    element.source,
                    replica,
                    DataLink {
                        cardinality: Cardinality::One2One,
                        source_property: element.source_property.clone(),
                        target_property: name.clone(),
                        value: element.value.clone(),
                        split_index: Some(element.index),
                    },
                ));
            }
            for group in &plan.one_to_one {
                let mut edge = graph.edges[group.edges[i]].clone();
                edge.target = replica;
                edges.push(edge);
            }
            for &index in incoming.iter().filter(|i| !plan.consumed.contains(*i)) {
                let mut edge = graph.edges[index].clone();
                edge.target = replica;
                edges.push(edge);
            }
            for &index in &outgoing {
                let mut edge = graph.edges[index].clone();
                edge.source = replica;
                if let EdgeKind::Data(link) = &mut edge.kind {
                    if let Some(value) = graph.property_value(replica, &link.source_property)? {
                        link.value = value;
                    }
                }
                edges.push(edge);
            }
            if serial && i > 0 {
                edges.extend(self.serial_edges(graph, &original, replicas[i - 1], replica)?);
            }
        }

        graph.remove_node(id);
        graph.edges.extend(edges);
        info!(node = %original.node_id, replicas = n, serial, "Split node");
        Ok(())
    }

    /// Orders replica `current` after `previous` and feeds `expand_value`
    /// parameters from the previous replica.
    fn serial_edges(
        &self,
        graph: &mut PipelineGraph,
        original: &JobNode,
        previous: NodeId,
        current: NodeId,
    ) -> Result<Vec<JobEdge>> {
        let mut edges = vec![JobEdge::after(previous, current)];
        for parameter in &original.spec.parameters {
            let Some(from) = &parameter.expand_value else {
                continue;
            };
            let from = template::single_reference(from)
                .and_then(|path| path.last().cloned())
                .unwrap_or_else(|| from.clone());
            let Some(value) = graph.property_value(previous, &from)? else {
                debug!(parameter = %parameter.name, from = %from, "No value to carry over");
                continue;
            };
            edges.push(JobEdge::data(
                previous,
                current,
                DataLink {
                    cardinality: Cardinality::One2One,
                    source_property: from,
                    target_property: parameter.name.clone(),
                    value,
                    split_index: None,
                },
            ));
        }
        Ok(edges)
    }

    fn separate_outputs(
        &self,
        graph: &mut PipelineGraph,
        original: &JobNode,
        replicas: &[NodeId],
        plan: &SplitPlan,
    ) -> Result<()> {
        let assigned = plan.assigned();
        let outputs = original
            .spec
            .parameters
            .iter()
            .filter(|p| p.is_output && p.is_file && !p.is_list && !assigned.contains(p.name.as_str()));

        for parameter in outputs {
            let mut values = Vec::with_capacity(replicas.len());
            for &replica in replicas {
                values.push(graph.property_value(replica, &parameter.name)?);
            }
            let distinct: HashSet<String> = values.iter().flatten().map(Value::render).collect();
            if distinct.len() == replicas.len() {
                continue;
            }
            for (&replica, value) in replicas.iter().zip(values) {
                let Some(Value::Str(path)) = value else {
                    continue;
                };
                let replica_id = &graph.nodes[&replica].node_id;
                let suffix = replica_id[original.node_id.len() + 1..].to_string();
                graph.set_node_value(replica, &parameter.name, Value::Str(file::with_suffix(&path, &suffix)))?;
            }
        }
        Ok(())
    }
}

fn expansion_is_serial(node: &JobNode) -> Result<bool> {
    let modes: HashSet<ExpandMode> = node
        .spec
        .parameters
        .iter()
        .map(|p| p.expand_mode)
        .filter(|m| *m != ExpandMode::None)
        .collect();
    if modes.contains(&ExpandMode::Parallel) && modes.contains(&ExpandMode::Serial) {
        return Err(Error::MixedExpansion(node.node_id.clone()));
    }
    Ok(modes.contains(&ExpandMode::Serial))
}
