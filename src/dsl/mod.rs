pub mod builder;

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative pipeline as produced by a loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    #[serde(default)]
    pub configuration: BTreeMap<String, Value>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "jobs")]
    pub job_specs: Vec<PipelineJobSpec>,
}

impl Pipeline {
    pub fn job(&self, id: &str) -> Option<&PipelineJobSpec> {
        self.job_specs.iter().find(|j| j.id == id)
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineJobSpec {
    pub id: String,
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub configuration: BTreeMap<String, Value>,
    /// Jobs that must finish before this one, independent of any data flow.
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, rename = "pipeline")]
    pub nested_pipeline: Option<Box<Pipeline>>,
}

impl PipelineJobSpec {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// How a job is replicated when it receives more values than it can take.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpandMode {
    #[default]
    None,
    Parallel,
    Serial,
}

/// A named slot on a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "list")]
    pub is_list: bool,
    #[serde(default, rename = "mandatory")]
    pub is_mandatory: bool,
    #[serde(default, rename = "file")]
    pub is_file: bool,
    #[serde(default, rename = "output")]
    pub is_output: bool,
    #[serde(default, rename = "default")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default, rename = "type")]
    pub type_tag: Option<String>,
    #[serde(default, rename = "expand")]
    pub expand_mode: ExpandMode,
    /// Under serial expansion, the parameter of the previous replica whose
    /// value feeds this one.
    #[serde(default)]
    pub expand_value: Option<String>,
    #[serde(default)]
    pub is_default_input: bool,
    #[serde(default)]
    pub is_default_output: bool,
}

impl Parameter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}
