use crate::dsl::{ExpandMode, Parameter, Pipeline, PipelineJobSpec};
use crate::value::Value;
use std::collections::BTreeMap;

pub struct PipelineBuilder {
    configuration: BTreeMap<String, Value>,
    parameters: Vec<Parameter>,
    pub jobs: Vec<PipelineJobSpec>, // public for manual tweaks in tests
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            configuration: BTreeMap::new(),
            parameters: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.to_string(), value.into());
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn job(self, id: &str) -> JobBuilder {
        JobBuilder {
            pipeline_builder: self,
            spec: PipelineJobSpec {
                id: id.to_string(),
                tool_id: id.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            configuration: self.configuration,
            parameters: self.parameters,
            job_specs: self.jobs,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JobBuilder {
    pipeline_builder: PipelineBuilder,
    spec: PipelineJobSpec,
}

impl JobBuilder {
    pub fn tool(mut self, tool_id: &str) -> Self {
        self.spec.tool_id = tool_id.to_string();
        self
    }

    /// Adds a parameter and, when given, its configured value.
    pub fn parameter(mut self, parameter: Parameter, value: Option<Value>) -> Self {
        if let Some(v) = value {
            self.spec.configuration.insert(parameter.name.clone(), v);
        }
        self.spec.parameters.push(parameter);
        self
    }

    pub fn input(self, name: &str, value: impl Into<Value>) -> Self {
        self.parameter(Parameter::new(name), Some(value.into()))
    }

    pub fn list_input(self, name: &str, value: impl Into<Value>) -> Self {
        self.parameter(Parameter::new(name).list(), Some(value.into()))
    }

    pub fn output(self, name: &str, value: impl Into<Value>) -> Self {
        self.parameter(Parameter::new(name).output(), Some(value.into()))
    }

    pub fn list_output(self, name: &str, value: impl Into<Value>) -> Self {
        self.parameter(Parameter::new(name).output().list(), Some(value.into()))
    }

    pub fn file_output(self, name: &str, value: impl Into<Value>) -> Self {
        self.parameter(Parameter::new(name).output().file(), Some(value.into()))
    }

    /// Declares a mandatory parameter without a value.
    pub fn mandatory(self, name: &str) -> Self {
        self.parameter(Parameter::new(name).mandatory(), None)
    }

    /// Configuration entry that is not backed by a parameter.
    pub fn config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.spec.configuration.insert(key.to_string(), value.into());
        self
    }

    pub fn expand(mut self, name: &str, mode: ExpandMode) -> Self {
        if let Some(p) = self.spec.parameters.iter_mut().find(|p| p.name == name) {
            p.expand_mode = mode;
        }
        self
    }

    pub fn expand_value(mut self, name: &str, from: &str) -> Self {
        if let Some(p) = self.spec.parameters.iter_mut().find(|p| p.name == name) {
            p.expand_value = Some(from.to_string());
        }
        self
    }

    pub fn after(mut self, job_id: &str) -> Self {
        self.spec.after.push(job_id.to_string());
        self
    }

    pub fn nested(mut self, pipeline: Pipeline) -> Self {
        self.spec.nested_pipeline = Some(Box::new(pipeline));
        self
    }

    pub fn build(mut self) -> PipelineBuilder {
        self.pipeline_builder.jobs.push(self.spec);
        self.pipeline_builder
    }
}

impl Parameter {
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    pub fn file(mut self) -> Self {
        self.is_file = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_expand(mut self, mode: ExpandMode) -> Self {
        self.expand_mode = mode;
        self
    }
}
