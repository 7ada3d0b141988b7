use jobgraph::dsl::builder::PipelineBuilder;
use jobgraph::dsl::{ExpandMode, Parameter};
use jobgraph::Value;

#[test]
fn test_build_linear_pipeline() {
    let pipeline = PipelineBuilder::new()
        .config("env", "prod")
        .job("fetch")
            .tool("curl")
            .output("archive", "data.tar.gz")
            .build()
        .job("unpack")
            .tool("tar")
            .input("archive", "${fetch.archive}")
            .mandatory("target")
            .build()
        .build();

    assert_eq!(pipeline.configuration.get("env"), Some(&Value::from("prod")));
    assert_eq!(pipeline.job_specs.len(), 2);

    let fetch = pipeline.job("fetch").expect("fetch job");
    assert_eq!(fetch.tool_id, "curl");
    let archive = fetch.parameter("archive").unwrap();
    assert!(archive.is_output);
    assert!(!archive.is_list);
    assert_eq!(fetch.configuration.get("archive"), Some(&Value::from("data.tar.gz")));

    let unpack = pipeline.job("unpack").expect("unpack job");
    let target = unpack.parameter("target").unwrap();
    assert!(target.is_mandatory);
    assert!(!unpack.configuration.contains_key("target"));
}

#[test]
fn test_job_defaults_tool_to_id() {
    let pipeline = PipelineBuilder::new().job("sort").build().build();
    assert_eq!(pipeline.job_specs[0].tool_id, "sort");
    assert!(pipeline.job_specs[0].after.is_empty());
    assert!(pipeline.job_specs[0].nested_pipeline.is_none());
}

#[test]
fn test_parameter_flags() {
    let parameter = Parameter::new("reads")
        .list()
        .file()
        .mandatory()
        .with_default(vec!["a.fq"])
        .with_expand(ExpandMode::Parallel);

    assert!(parameter.is_list);
    assert!(parameter.is_file);
    assert!(parameter.is_mandatory);
    assert!(!parameter.is_output);
    assert_eq!(parameter.default_value, Some(Value::from(vec!["a.fq"])));
    assert_eq!(parameter.expand_mode, ExpandMode::Parallel);
}

#[test]
fn test_expand_settings_apply_to_declared_parameter() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .input("chunk", vec!["1", "2"])
            .expand("chunk", ExpandMode::Serial)
            .parameter(Parameter::new("previous"), None)
            .expand_value("previous", "${out}")
            .expand("unknown", ExpandMode::Parallel)
            .build()
        .build();

    let job = pipeline.job("A").unwrap();
    assert_eq!(job.parameter("chunk").unwrap().expand_mode, ExpandMode::Serial);
    assert_eq!(job.parameter("previous").unwrap().expand_value.as_deref(), Some("${out}"));
    assert!(job.parameter("unknown").is_none());
}

#[test]
fn test_pipeline_serializes_with_yaml_names() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .list_output("files", vec!["x"])
            .build()
        .build();

    let json = serde_json::to_value(&pipeline).unwrap();
    assert_eq!(json["jobs"][0]["id"], "A");
    assert_eq!(json["jobs"][0]["parameters"][0]["list"], true);
    assert_eq!(json["jobs"][0]["parameters"][0]["output"], true);
    assert_eq!(json["jobs"][0]["configuration"]["files"][0], "x");
}
