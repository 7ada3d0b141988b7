use jobgraph::dsl::builder::PipelineBuilder;
use jobgraph::graph::{Cardinality, EdgeKind};
use jobgraph::{Compiler, CompilerOptions, Error, PipelineGraph, ValidationError, Value};

#[test]
fn test_after_dependency_creates_single_edge() {
    // 1. Build pipeline: B runs after A, no data flow
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("output_a", "out.txt")
            .build()
        .job("B")
            .input("input_b", "in.txt")
            .after("A")
            .build()
        .build();

    // 2. Build graph
    let graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");

    // 3. Assert structure
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.in_degree("B"), 1);
    assert_eq!(graph.in_degree("A"), 0);

    let edges = graph.edges_between("A", "B");
    assert_eq!(edges.len(), 1);
    assert!(edges[0].is_after());
}

#[test]
fn test_shared_output_reference_collapses_to_one_edge() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("output_a", "output-1")
            .build()
        .job("B")
            .input("input_b", "${A.output_a}")
            .output("output_b", "${A.output_a}")
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    // one edge per target property before reduction
    assert_eq!(graph.edge_count(), 2);
    assert!(graph
        .edges()
        .iter()
        .all(|e| e.cardinality() == Some(Cardinality::One2One)));

    graph.prepare().expect("Prepare failed");
    graph.reduce_dependencies().expect("Reduction failed");

    assert_eq!(graph.edge_count(), 1);
    let config = graph.configuration("B").expect("B has a configuration");
    assert_eq!(config.get("input_b"), Some(&Value::from("output-1")));
    assert_eq!(config.get("output_b"), Some(&Value::from("output-1")));
}

#[test]
fn test_edge_carries_properties_and_value() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("out", "a.txt")
            .build()
        .job("B")
            .input("in", "${A.out}")
            .build()
        .build();

    let graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    let edge = &graph.edges()[0];
    assert_eq!(graph.edge_endpoints(edge), ("A", "B"));

    let EdgeKind::Data(link) = edge.kind() else {
        panic!("expected a data edge");
    };
    assert_eq!(link.source_property, "out");
    assert_eq!(link.target_property, "in");
    assert_eq!(link.value, Value::from("a.txt"));
    assert_eq!(link.split_index, None);
}

#[test]
fn test_reference_to_non_output_creates_no_edge() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .input("threads", 4)
            .build()
        .job("B")
            .input("threads", "${A.threads}")
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    assert_eq!(graph.edge_count(), 0);

    graph.prepare().expect("Prepare failed");
    let config = graph.configuration("B").unwrap();
    assert_eq!(config.get("threads"), Some(&Value::Int(4)));
}

#[test]
fn test_template_reference_is_substituted() {
    let pipeline = PipelineBuilder::new()
        .config("workdir", "/scratch")
        .job("A")
            .output("bam", "/data/sample.bam")
            .build()
        .job("B")
            .input("index", "${workdir}/${A.bam.name}.bai")
            .input("bam", "${A.bam}")
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    graph.prepare().expect("Prepare failed");

    let config = graph.configuration("B").unwrap();
    assert_eq!(config.get("index"), Some(&Value::from("/scratch/sample.bai")));
    assert_eq!(config.get("bam"), Some(&Value::from("/data/sample.bam")));
}

#[test]
fn test_caller_pipeline_is_not_mutated() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .input("x", vec!["1", "2"])
            .build()
        .build();
    let before = pipeline.clone();

    let mut graph = PipelineGraph::new(&pipeline).unwrap();
    graph.prepare().unwrap();

    assert_eq!(pipeline, before);
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_duplicate_and_empty_ids_are_fatal() {
    let pipeline = PipelineBuilder::new()
        .job("A").build()
        .job("A").build()
        .job("").build()
        .build();

    let err = PipelineGraph::new(&pipeline).unwrap_err();
    assert_eq!(
        err,
        Error::InvalidPipeline(vec![
            ValidationError::DuplicateJobId("A".to_string()),
            ValidationError::EmptyJobId { index: 2 },
        ])
    );
}

#[test]
fn test_cycle_is_reported() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .input("in", "${B.out}")
            .output("out", "a")
            .build()
        .job("B")
            .input("in", "${A.out}")
            .output("out", "b")
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    let err = graph.prepare().unwrap_err();
    assert_eq!(err, Error::Cycle(vec!["A".to_string(), "B".to_string()]));
}

#[test]
fn test_unresolved_reference_aborts_prepare() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .input("in", "${nowhere}")
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).expect("Graph construction failed");
    let err = graph.prepare().unwrap_err();
    assert_eq!(err, Error::UnresolvedReference("nowhere".to_string()));
}

#[test]
fn test_compiler_runs_all_stages() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("out", "a.txt")
            .build()
        .job("B")
            .input("in", "${A.out}")
            .output("out", "b.txt")
            .build()
        .job("C")
            .input("first", "${A.out}")
            .input("second", "${B.out}")
            .mandatory("threads")
            .build()
        .build();

    let compiled = Compiler::new().compile(&pipeline).expect("Compilation failed");
    let graph = &compiled.graph;

    // A -> C is implied by A -> B -> C
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.edges_between("A", "C").is_empty());

    let order: Vec<&str> = graph
        .ordered_nodes()
        .unwrap()
        .into_iter()
        .map(|n| n.node_id())
        .collect();
    assert_eq!(order, vec!["A", "B", "C"]);

    assert!(!compiled.is_valid());
    assert_eq!(
        compiled.validation_errors,
        vec![ValidationError::MissingParameter {
            job: "C".to_string(),
            parameter: "threads".to_string(),
        }]
    );
}

#[test]
fn test_compiler_options_skip_reduction() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("out", "a.txt")
            .build()
        .job("B")
            .input("in", "${A.out}")
            .output("out", "b.txt")
            .build()
        .job("C")
            .input("first", "${A.out}")
            .input("second", "${B.out}")
            .build()
        .build();

    let options = CompilerOptions {
        reduce_dependencies: false,
        ..CompilerOptions::default()
    };
    let compiled = Compiler::with_options(options).compile(&pipeline).unwrap();
    assert_eq!(compiled.graph.edge_count(), 3);
}

#[test]
fn test_working_dir_prefixes_file_inputs() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .file_output("out", "result.txt")
            .config("working_dir", "/work/a")
            .build()
        .job("B")
            .parameter(jobgraph::dsl::Parameter::new("in").file(), Some(Value::from("${A.out}")))
            .build()
        .build();

    let mut graph = PipelineGraph::new(&pipeline).unwrap();
    graph.prepare().unwrap();

    let config = graph.configuration("B").unwrap();
    assert_eq!(config.get("in"), Some(&Value::from("/work/a/result.txt")));
}

#[test]
fn test_summary_lists_nodes_in_order() {
    let pipeline = PipelineBuilder::new()
        .job("A")
            .output("out", "a.txt")
            .build()
        .job("B")
            .input("in", "${A.out}")
            .build()
        .build();

    let mut compiled = Compiler::new().compile(&pipeline).unwrap();
    let summary = compiled.graph.to_summary().unwrap();

    assert_eq!(summary.nodes.len(), 2);
    assert_eq!(summary.nodes[1].id, "B");
    assert_eq!(summary.nodes[1].configuration.get("in"), Some(&Value::from("a.txt")));
    assert_eq!(summary.edges.len(), 1);
    assert_eq!(summary.edges[0].kind, "One2One");

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["edges"][0]["source"], "A");
}
