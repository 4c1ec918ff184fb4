//! Combing equivalence tests driven by dot fixtures with an `entry` root.

use restructure::cfg::dot::parse_dot;
use restructure::RegionCfg;

fn load(name: &str) -> RegionCfg<String> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = format!("{}/tests/dot/{}", env!("CARGO_MANIFEST_DIR"), name);
    let text = std::fs::read_to_string(&path).unwrap();
    let dot = parse_dot(&text, "entry").unwrap();
    RegionCfg::from_source(&dot).unwrap()
}

#[test]
fn trivial_graph_equal() {
    let mut input = load("trivial.dot");
    let reference = load("trivial.dot");
    input.comb().unwrap();
    assert!(input.is_topologically_equivalent(&reference));
}

#[test]
fn simple_graph_equal() {
    let mut input = load("simple.dot");
    let reference = load("simple.dot");
    input.comb().unwrap();
    assert!(input.is_topologically_equivalent(&reference));
}

#[test]
fn simple_graph_not_equal() {
    let mut input = load("simple.dot");
    let reference = load("trivial.dot");
    input.comb().unwrap();
    assert!(!input.is_topologically_equivalent(&reference));
}

#[test]
fn combing_twice_is_identity() {
    let mut input = load("simple.dot");
    input.comb().unwrap();
    let once = input.clone();
    input.comb().unwrap();
    assert!(input.is_topologically_equivalent(&once));
}

#[test]
fn dot_dump_mentions_every_vertex() {
    let region = load("simple.dot");
    let dump = region.to_dot();
    assert!(dump.starts_with("digraph"));
    assert_eq!(dump.matches("->").count(), 5);
    for name in ["entry", "a", "b", "join", "exit"] {
        assert!(dump.contains(name), "missing {} in dump", name);
    }
}
