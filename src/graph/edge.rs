use crate::error::{Error, Result};
use crate::graph::node::NodeId;
use crate::graph::PipelineGraph;
use crate::scope::{file, template};
use crate::value::Value;
use serde::Serialize;
use tracing::debug;

/// Job configuration key naming the directory relative file outputs live in.
pub const WORKING_DIR: &str = "working_dir";

/// How many values flow across a data edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cardinality {
    One2One,
    One2Many,
    Many2One,
    Many2Many,
}

impl Cardinality {
    pub fn between(source_is_list: bool, target_is_list: bool) -> Self {
        match (source_is_list, target_is_list) {
            (true, true) => Cardinality::Many2Many,
            (true, false) => Cardinality::Many2One,
            (false, true) => Cardinality::One2Many,
            (false, false) => Cardinality::One2One,
        }
    }
}

/// A concrete data dependency between an output of one job and a parameter
/// of another.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLink {
    pub cardinality: Cardinality,
    pub source_property: String,
    pub target_property: String,
    pub value: Value,
    /// Set once the link carries a single element of a list-valued source.
    pub split_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Ordering only.
    After,
    Data(DataLink),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEdge {
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) kind: EdgeKind,
}

impl JobEdge {
    pub fn after(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::After,
        }
    }

    pub fn data(source: NodeId, target: NodeId, link: DataLink) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::Data(link),
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    pub fn link(&self) -> Option<&DataLink> {
        match &self.kind {
            EdgeKind::Data(link) => Some(link),
            EdgeKind::After => None,
        }
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        self.link().map(|l| l.cardinality)
    }

    pub fn is_after(&self) -> bool {
        matches!(self.kind, EdgeKind::After)
    }

    /// Computes the target's new value for the linked property.
    ///
    /// `existing` is the target's current raw value and `declared` the value
    /// its job spec was written with. `source_names` are the names the source
    /// job may be referenced by in either.
    pub fn merge(
        &self,
        target_job: &str,
        existing: Option<&Value>,
        declared: Option<&Value>,
        source_value: Value,
        source_names: &[&str],
    ) -> Result<Option<Value>> {
        let EdgeKind::Data(link) = &self.kind else {
            return Ok(None);
        };
        let merged = match link.cardinality {
            Cardinality::One2One => {
                let value = match link.split_index {
                    Some(i) if source_value.is_list() => source_value
                        .element(i)
                        .cloned()
                        .unwrap_or_else(|| link.value.clone()),
                    _ => source_value,
                };
                match existing {
                    Some(Value::Str(raw)) => substitute(raw, &value, &link.source_property, source_names)?,
                    _ => value,
                }
            }
            Cardinality::One2Many => {
                let incoming = derive_fields(declared, source_value, &link.source_property, source_names)?;
                let kept: Vec<Value> = existing
                    .map(|v| v.as_list().to_vec())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|v| !v.contains_reference())
                    .collect();
                Value::List(Value::flatten_unique(kept.iter().chain(&incoming)))
            }
            Cardinality::Many2Many => {
                let incoming = derive_fields(declared, source_value, &link.source_property, source_names)?;
                let kept: Vec<Value> = existing
                    .map(|v| v.as_list().to_vec())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|v| !is_placeholder(v, &link.source_property, source_names))
                    .collect();
                Value::List(Value::flatten_unique(kept.iter().chain(&incoming)))
            }
            Cardinality::Many2One => {
                return Err(Error::UnsplitManyToOne {
                    job: target_job.to_string(),
                    parameter: link.target_property.clone(),
                });
            }
        };
        Ok(Some(merged))
    }
}

fn refers_to(path: &[String], property: &str, source_names: &[&str]) -> bool {
    path.len() >= 2 && path[1] == property && source_names.contains(&path[0].as_str())
}

/// The path of `value` if it is a lone reference to the source property,
/// possibly followed by file fields.
fn placeholder_path(value: &Value, property: &str, source_names: &[&str]) -> Option<Vec<String>> {
    value
        .as_str()
        .and_then(template::single_reference)
        .filter(|path| refers_to(path, property, source_names))
}

fn is_placeholder(value: &Value, property: &str, source_names: &[&str]) -> bool {
    placeholder_path(value, property, source_names).is_some()
}

/// What the source contributes to a list target: one derived value per
/// placeholder in `declared` (`${A.out.name}` yields the names), or the
/// plain source value when nothing in `declared` names it.
fn derive_fields(
    declared: Option<&Value>,
    source_value: Value,
    property: &str,
    source_names: &[&str],
) -> Result<Vec<Value>> {
    let paths: Vec<Vec<String>> = declared
        .map(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| placeholder_path(v, property, source_names))
        .collect();
    if paths.is_empty() {
        return Ok(vec![source_value]);
    }
    paths
        .iter()
        .map(|path| file::derive(source_value.clone(), &path[2..], &path.join(".")))
        .collect()
}

/// Replaces references to the source inside `raw` with `value`.
///
/// A raw value that is exactly one such reference yields `value` itself
/// (with any file fields applied); a raw value that never mentions the source
/// is replaced outright.
fn substitute(raw: &str, value: &Value, property: &str, source_names: &[&str]) -> Result<Value> {
    let tokens = template::tokenize(raw);
    let mentions = tokens
        .iter()
        .filter_map(|t| t.reference())
        .any(|path| refers_to(path, property, source_names));
    if !mentions {
        return Ok(value.clone());
    }
    if let [template::Token::Reference(path)] = tokens.as_slice() {
        return file::derive(value.clone(), &path[2..], &path.join("."));
    }
    if value.is_list() {
        return Ok(value.clone());
    }

    let mut out = String::new();
    for token in &tokens {
        match token {
            template::Token::Literal(s) => out.push_str(s),
            template::Token::Reference(path) if refers_to(path, property, source_names) => {
                out.push_str(&file::derive(value.clone(), &path[2..], &path.join("."))?.render());
            }
            template::Token::Reference(path) => out.push_str(&template::format_reference(path)),
        }
    }
    Ok(Value::Str(out))
}

impl PipelineGraph {
    /// Pushes the value carried by edge `index` into its target's configuration.
    pub(crate) fn apply_edge(&mut self, index: usize) -> Result<()> {
        let edge = self.edges[index].clone();
        let Some(link) = edge.link() else {
            return Ok(());
        };

        let mut source_value = self
            .property_value(edge.source, &link.source_property)?
            .unwrap_or_else(|| link.value.clone());

        let source = &self.nodes[&edge.source];
        let target = &self.nodes[&edge.target];
        let target_is_file = target
            .parameter(&link.target_property)
            .is_some_and(|p| p.is_file);
        if target_is_file {
            if let Some(dir) = source.configured(WORKING_DIR).and_then(Value::as_str) {
                source_value = prefix_directory(source_value, dir);
            }
        }

        let source_names = [source.node_id.as_str(), source.spec.id.as_str()];
        let existing = target.configured(&link.target_property);
        let declared = target.declared(&link.target_property);
        let merged = edge.merge(&target.node_id, existing, declared, source_value, &source_names)?;

        if let Some(value) = merged {
            debug!(
                source = %source.node_id,
                target = %target.node_id,
                property = %link.target_property,
                "Applied edge configuration"
            );
            let target_id = edge.target;
            let property = link.target_property.clone();
            self.set_node_value(target_id, &property, value)?;
        }
        Ok(())
    }
}

fn prefix_directory(value: Value, dir: &str) -> Value {
    match value {
        Value::Str(path) => Value::Str(file::in_directory(dir, &path)),
        Value::List(items) => Value::List(items.into_iter().map(|v| prefix_directory(v, dir)).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(cardinality: Cardinality, split_index: Option<usize>) -> JobEdge {
        JobEdge::data(
            NodeId(0),
            NodeId(1),
            DataLink {
                cardinality,
                source_property: "out".to_string(),
                target_property: "in".to_string(),
                value: Value::from("fallback"),
                split_index,
            },
        )
    }

    #[test]
    fn test_one_to_one_substitutes_inside_template() {
        let edge = link(Cardinality::One2One, None);
        let existing = Value::from("--in ${A.out.name}.idx ${other}");
        let merged = edge
            .merge("B", Some(&existing), None, Value::from("/data/x.bam"), &["A"])
            .unwrap();
        assert_eq!(merged, Some(Value::from("--in x.idx ${other}")));
    }

    #[test]
    fn test_one_to_one_picks_split_element() {
        let edge = link(Cardinality::One2One, Some(1));
        let merged = edge
            .merge("B", None, None, Value::from(vec!["a", "b"]), &["A"])
            .unwrap();
        assert_eq!(merged, Some(Value::from("b")));
    }

    #[test]
    fn test_one_to_many_drops_placeholders() {
        let edge = link(Cardinality::One2Many, None);
        let existing = Value::from(vec!["${A.out}", "keep", "x"]);
        let merged = edge
            .merge("B", Some(&existing), Some(&existing), Value::from("x"), &["A"])
            .unwrap();
        assert_eq!(merged, Some(Value::from(vec!["keep", "x"])));
    }

    #[test]
    fn test_many_to_many_keeps_foreign_references() {
        let edge = link(Cardinality::Many2Many, None);
        let existing = Value::from(vec!["${A.out}", "${C.out}"]);
        let merged = edge
            .merge("B", Some(&existing), Some(&existing), Value::from(vec!["1", "2"]), &["A"])
            .unwrap();
        assert_eq!(merged, Some(Value::from(vec!["${C.out}", "1", "2"])));
    }

    #[test]
    fn test_one_to_many_applies_file_fields() {
        let edge = link(Cardinality::One2Many, None);
        let declared = Value::from("${A.out.name}");
        let existing = Value::from(vec!["1"]);
        let merged = edge
            .merge("B", Some(&existing), Some(&declared), Value::from("/d/2.txt"), &["A"])
            .unwrap();
        assert_eq!(merged, Some(Value::from(vec!["1", "2"])));
    }

    #[test]
    fn test_many_to_many_applies_file_fields() {
        let edge = link(Cardinality::Many2Many, None);
        let declared = Value::from(vec!["${A.out.extension}", "keep"]);
        let merged = edge
            .merge(
                "B",
                Some(&declared),
                Some(&declared),
                Value::from(vec!["/d/1.txt", "/d/2.bam"]),
                &["A"],
            )
            .unwrap();
        assert_eq!(merged, Some(Value::from(vec!["keep", "txt", "bam"])));
    }

    #[test]
    fn test_many_to_one_is_rejected() {
        let edge = link(Cardinality::Many2One, None);
        let err = edge
            .merge("B", None, None, Value::from(vec!["1", "2"]), &["A"])
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnsplitManyToOne {
                job: "B".to_string(),
                parameter: "in".to_string(),
            }
        );
    }

    #[test]
    fn test_after_edge_carries_nothing() {
        let edge = JobEdge::after(NodeId(0), NodeId(1));
        let merged = edge.merge("B", None, None, Value::from("x"), &["A"]).unwrap();
        assert_eq!(merged, None);
    }

    #[test]
    fn test_working_dir_prefix() {
        let value = Value::from(vec!["a.txt", "/abs/b.txt"]);
        assert_eq!(
            prefix_directory(value, "/work"),
            Value::from(vec!["/work/a.txt", "/abs/b.txt"])
        );
    }
}
