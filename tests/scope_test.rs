use jobgraph::scope::{file, PropertySource, ScopeTree};
use jobgraph::{Error, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn tree_with_jobs() -> ScopeTree {
    // root: threads=4, files=[a, b]
    //   A: x=2, out="${x}.txt"
    //   B: y="from-b"
    let mut tree = ScopeTree::new();
    let root = tree.root();
    tree.put(root, "threads", Value::Int(4)).unwrap();
    tree.put(root, "x", Value::Int(1)).unwrap();
    tree.put(root, "files", Value::from(vec!["a", "b"])).unwrap();

    let a = tree.create_child(root, "A").unwrap();
    tree.put(a, "x", Value::Int(2)).unwrap();
    tree.put(a, "out", Value::from("${x}.txt")).unwrap();

    let b = tree.create_child(root, "B").unwrap();
    tree.put(b, "y", Value::from("from-b")).unwrap();
    tree
}

#[test]
fn test_single_reference_keeps_native_type() {
    let mut tree = tree_with_jobs();
    let root = tree.root();

    assert_eq!(tree.get(root, "${threads}").unwrap(), Value::Int(4));
    assert_eq!(tree.get(root, "-t ${threads}").unwrap(), Value::from("-t 4"));
    assert_eq!(tree.get(root, "${files}").unwrap(), Value::from(vec!["a", "b"]));
    assert_eq!(tree.get(root, "plain").unwrap(), Value::from("plain"));
}

#[test]
fn test_interpolated_float_matches_native_form() {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    tree.put(root, "f", Value::Float(1.0)).unwrap();

    assert_eq!(tree.get(root, "${f}").unwrap(), Value::Float(1.0));
    assert_eq!(tree.get(root, "v${f}").unwrap(), Value::from("v1.0"));
}

#[test]
fn test_lookup_prefers_nearest_scope() {
    let mut tree = tree_with_jobs();
    let root = tree.root();
    let a = tree.child(root, "A").unwrap();

    // own child shadows the global value
    assert_eq!(tree.get(a, "${x}").unwrap(), Value::Int(2));
    assert_eq!(tree.get(root, "${x}").unwrap(), Value::Int(1));
    // values resolve relative to the scope that owns them
    assert_eq!(tree.get(root, "${A.out}").unwrap(), Value::from("2.txt"));
    // ancestor lookup
    assert_eq!(tree.get(a, "${threads}").unwrap(), Value::Int(4));
    // sibling subtree, qualified and breadth-first
    assert_eq!(tree.get(a, "${B.y}").unwrap(), Value::from("from-b"));
    assert_eq!(tree.get(a, "${y}").unwrap(), Value::from("from-b"));
}

#[test]
fn test_unresolved_reference() {
    let mut tree = tree_with_jobs();
    let root = tree.root();

    let err = tree.get(root, "${missing}").unwrap_err();
    assert_eq!(err, Error::UnresolvedReference("missing".to_string()));

    let err = tree.get(root, "${A.missing}").unwrap_err();
    assert_eq!(err, Error::UnresolvedReference("A.missing".to_string()));
}

#[test]
fn test_self_reference_is_detected() {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    tree.put(root, "scope", Value::from("${scope}")).unwrap();

    let err = tree.get(root, "${scope}").unwrap_err();
    assert_eq!(err, Error::SelfReference("scope".to_string()));
}

#[test]
fn test_indirect_cycle_is_detected() {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    tree.put(root, "a", Value::from("${b}")).unwrap();
    tree.put(root, "b", Value::from("x-${a}")).unwrap();

    let err = tree.get(root, "${a}").unwrap_err();
    assert!(matches!(err, Error::SelfReference(_)), "unexpected error: {err:?}");
}

#[test]
fn test_list_broadcast() {
    let mut tree = tree_with_jobs();
    let root = tree.root();

    assert_eq!(
        tree.get(root, "${files}.${threads}.txt").unwrap(),
        Value::from(vec!["a.4.txt", "b.4.txt"])
    );
    assert_eq!(
        tree.get(root, "${files}-${files}").unwrap(),
        Value::from(vec!["a-a", "b-b"])
    );
}

#[test]
fn test_broadcast_length_mismatch() {
    let mut tree = tree_with_jobs();
    let root = tree.root();
    tree.put(root, "three", Value::from(vec!["x", "y", "z"])).unwrap();

    let err = tree.get(root, "${files}/${three}").unwrap_err();
    assert_eq!(
        err,
        Error::BroadcastMismatch {
            template: "${files}/${three}".to_string(),
            left: 2,
            right: 3,
        }
    );
}

#[test]
fn test_list_elements_are_resolved_and_spliced() {
    let mut tree = tree_with_jobs();
    let root = tree.root();

    let raw = Value::List(vec![Value::from("${files}"), Value::from("c"), Value::from("${threads}")]);
    let resolved = tree.resolve(root, &raw).unwrap();
    assert_eq!(
        resolved,
        Value::List(vec![Value::from("a"), Value::from("b"), Value::from("c"), Value::Int(4)])
    );
}

#[test]
fn test_file_fields_on_references() {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    tree.put(root, "input", Value::from("/data/run/sample.fastq.gz")).unwrap();
    tree.put(root, "many", Value::from(vec!["x/a.bam", "b.sam"])).unwrap();

    assert_eq!(tree.get(root, "${input.name}").unwrap(), Value::from("sample"));
    assert_eq!(tree.get(root, "${input.parent}").unwrap(), Value::from("/data/run/"));
    assert_eq!(tree.get(root, "${input.extension}").unwrap(), Value::from("fastq.gz"));
    assert_eq!(
        tree.get(root, "${input.parent}${input.name}.bam").unwrap(),
        Value::from("/data/run/sample.bam")
    );
    assert_eq!(tree.get(root, "${many.name}").unwrap(), Value::from(vec!["a", "b"]));
    assert_eq!(tree.get(root, "${many.parent}").unwrap(), Value::from(vec!["x/", ""]));

    let err = tree.get(root, "${input.size}").unwrap_err();
    assert!(matches!(err, Error::UnknownFileField { .. }));
}

#[test]
fn test_file_field_derivations() {
    assert_eq!(file::name("bla.blu"), "bla");
    assert_eq!(file::parent("bla.blu"), "");
    assert_eq!(file::extension("bla.blu"), "blu");

    assert_eq!(file::name("/tmp/bla.blub"), "bla");
    assert_eq!(file::parent("/tmp/bla.blub"), "/tmp/");
    assert_eq!(file::extension("/tmp/bla.blub"), "blub");

    assert_eq!(file::parent("abc/tmp/bla.blub"), "abc/tmp/");
    assert_eq!(file::extension("noext"), "");

    assert_eq!(file::with_suffix("out.txt", "split_0"), "out.split_0.txt");
    assert_eq!(file::with_suffix("/tmp/out", "seq_1"), "/tmp/out.seq_1");
}

#[test]
fn test_tree_shape_constraints() {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let leaf = tree.put(root, "leaf", Value::Int(1)).unwrap();
    let group = tree.create_child(root, "group").unwrap();
    tree.create_child(group, "inner").unwrap();

    assert!(matches!(tree.create_child(leaf, "x"), Err(Error::ScopeHasValue(_))));
    assert!(matches!(tree.set_value(group, Value::Int(1)), Err(Error::ScopeHasChildren(_))));
    assert!(matches!(tree.create_child(root, "group"), Err(Error::DuplicateScope { .. })));
}

#[test]
fn test_set_updates_dependent_values() {
    let mut tree = tree_with_jobs();
    let root = tree.root();
    assert_eq!(tree.get(root, "${A.out}").unwrap(), Value::from("2.txt"));

    tree.set(root, "${A.x}", Value::Int(7)).unwrap();
    assert_eq!(tree.get(root, "${A.out}").unwrap(), Value::from("7.txt"));

    assert!(matches!(
        tree.set(root, "prefix ${A.x}", Value::Int(1)),
        Err(Error::NotSingleReference(_))
    ));
}

#[derive(Default)]
struct Settings {
    output: Option<Value>,
}

impl PropertySource for Settings {
    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "output" => self.output.clone(),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> bool {
        match name {
            "output" => {
                self.output = Some(value);
                true
            }
            _ => false,
        }
    }
}

#[test]
fn test_write_back_to_bound_source() {
    let settings = Rc::new(RefCell::new(Settings {
        output: Some(Value::from("first.txt")),
    }));
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let leaf = tree.create_child(root, "out").unwrap();
    tree.bind(leaf, settings.clone(), "output").unwrap();
    assert_eq!(tree.get(root, "${out}").unwrap(), Value::from("first.txt"));

    tree.set(root, "${out}", Value::from("second.txt")).unwrap();
    assert_eq!(settings.borrow().output, Some(Value::from("second.txt")));
    assert_eq!(tree.get(root, "${out}").unwrap(), Value::from("second.txt"));
}

struct ReadOnly;

impl PropertySource for ReadOnly {
    fn get_property(&self, _name: &str) -> Option<Value> {
        Some(Value::from("fixed"))
    }

    fn set_property(&mut self, _name: &str, _value: Value) -> bool {
        false
    }
}

#[test]
fn test_write_back_without_writable_property_is_ignored() {
    let source = Rc::new(RefCell::new(ReadOnly));
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let leaf = tree.create_child(root, "constant").unwrap();
    tree.bind(leaf, source.clone(), "value").unwrap();

    tree.set(root, "${constant}", Value::from("changed")).unwrap();
    assert_eq!(tree.get(root, "${constant}").unwrap(), Value::from("changed"));
    assert_eq!(source.borrow().get_property("value"), Some(Value::from("fixed")));
}

#[test]
fn test_bind_requires_a_property_value() {
    let settings = Rc::new(RefCell::new(Settings::default()));
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let leaf = tree.create_child(root, "out").unwrap();
    assert!(matches!(tree.bind(leaf, settings, "output"), Err(Error::NotAValue(_))));
}
