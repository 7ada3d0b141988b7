use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use crate::dsl::Pipeline;

pub fn load_pipeline_from_yaml(file_path: &str) -> Result<Pipeline> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path))?;

    parse_pipeline(&yaml_content)
        .with_context(|| format!("Failed to load pipeline from {}", file_path))
}

pub fn parse_pipeline(yaml_content: &str) -> Result<Pipeline> {
    let pipeline: Pipeline = serde_yaml::from_str(yaml_content)
        .context("Failed to deserialize pipeline definition")?;

    Ok(pipeline)
}
