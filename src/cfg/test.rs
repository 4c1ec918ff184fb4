use super::*;

use std::collections::HashMap as Map;

/// A CFG described by vertex name and successor lists.
struct VecSource {
    entry: usize,
    verts: Vec<(&'static str, Vec<usize>)>,
    labels: Map<usize, Vec<LabelSet>>,
}

impl VecSource {
    fn new(entry: usize, verts: Vec<(&'static str, Vec<usize>)>) -> Self {
        VecSource {
            entry,
            verts,
            labels: Map::new(),
        }
    }

    /// Makes vertex `v` a switch; one label list per successor, an empty
    /// list being the default case.
    fn with_labels(mut self, v: usize, labels: Vec<Vec<u64>>) -> Self {
        self.labels
            .insert(v, labels.into_iter().map(|ls| ls.into_iter().collect()).collect());
        self
    }
}

impl CfgSource for VecSource {
    type Block = String;

    fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    fn entry(&self) -> usize {
        self.entry
    }

    fn block(&self, v: usize) -> Option<String> {
        Some(self.verts[v].0.to_owned())
    }

    fn name(&self, v: usize) -> String {
        self.verts[v].0.to_owned()
    }

    fn successors(&self, v: usize) -> Vec<usize> {
        self.verts[v].1.clone()
    }

    fn case_labels(&self, v: usize) -> Option<Vec<LabelSet>> {
        self.labels.get(&v).cloned()
    }
}

fn count_kind<B>(region: &RegionCfg<B>, pred: impl Fn(&BlockKind<B>) -> bool) -> usize {
    region
        .graph()
        .node_indices()
        .filter(|&n| pred(region.node(n).kind()))
        .count()
}

#[test]
fn comb_is_identity_on_a_trivial_graph() {
    let src = VecSource::new(0, vec![("entry", vec![1]), ("exit", vec![])]);
    let reference = RegionCfg::from_source(&src).unwrap();
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();
    assert!(region.is_topologically_equivalent(&reference));
}

#[test]
fn comb_is_identity_on_a_diamond() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2]),
            ("a", vec![3]),
            ("b", vec![3]),
            ("join", vec![4]),
            ("exit", vec![]),
        ],
    );
    let reference = RegionCfg::from_source(&src).unwrap();
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();
    assert!(region.is_topologically_equivalent(&reference));
}

#[test]
fn premature_merge_is_cloned_and_combing_reaches_a_fixed_point() {
    // both branches reach m, but m is not where entry's branches converge
    // since a can also skip straight to the exit
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2]),
            ("a", vec![3, 5]),
            ("b", vec![3]),
            ("m", vec![4]),
            ("exit", vec![]),
            ("x", vec![4]),
        ],
    );
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();
    assert_eq!(region.graph().node_count(), 7);

    let reference = region.clone();
    region.comb().unwrap();
    assert!(region.is_topologically_equivalent(&reference));
}

#[test]
fn cloning_a_switch_marks_it_weaved() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2]),
            ("p", vec![3, 6]),
            ("q", vec![3]),
            ("s", vec![4, 5]),
            ("c1", vec![6]),
            ("c2", vec![6]),
            ("exit", vec![]),
        ],
    )
    .with_labels(3, vec![vec![3], vec![]]);
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();
    // the switch and its cases were duplicated, once per predecessor
    assert_eq!(region.graph().node_count(), 10);
    let weaved = region
        .graph()
        .node_indices()
        .filter(|&n| region.node(n).is_weaved())
        .count();
    assert_eq!(weaved, 2);
}

#[test]
fn single_entry_loop_collapses_with_continue_and_break_sinks() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1]),
            ("body", vec![2]),
            ("check", vec![1, 3]),
            ("exit", vec![]),
        ],
    );
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();

    let collapsed: Vec<_> = region
        .graph()
        .node_indices()
        .filter(|&n| matches!(region.node(n).kind(), BlockKind::Collapsed(_)))
        .collect();
    assert_eq!(collapsed.len(), 1);
    let body = region.node(collapsed[0]).collapsed_region().unwrap();
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Continue)), 1);
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Break)), 1);
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Tile)), 1);
    // no dispatcher needed for a single-entry single-exit loop
    assert_eq!(
        count_kind(body, |k| matches!(k, BlockKind::EntryDispatcher)),
        0
    );
}

#[test]
fn self_loop_collapses() {
    let src = VecSource::new(0, vec![("entry", vec![1]), ("l", vec![1, 2]), ("exit", vec![])]);
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();
    let collapsed: Vec<_> = region
        .graph()
        .node_indices()
        .filter(|&n| matches!(region.node(n).kind(), BlockKind::Collapsed(_)))
        .collect();
    assert_eq!(collapsed.len(), 1);
    let body = region.node(collapsed[0]).collapsed_region().unwrap();
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Continue)), 1);
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Break)), 1);
}

#[test]
fn two_entry_loop_gets_an_entry_dispatcher() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2]),
            ("p1", vec![3]),
            ("p2", vec![4]),
            ("h", vec![4]),
            ("x", vec![3, 5]),
            ("exit", vec![]),
        ],
    );
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();

    let collapsed: Vec<_> = region
        .graph()
        .node_indices()
        .filter(|&n| matches!(region.node(n).kind(), BlockKind::Collapsed(_)))
        .collect();
    assert_eq!(collapsed.len(), 1);
    let body = region.node(collapsed[0]).collapsed_region().unwrap();

    // the dispatcher is the unique loop header
    assert!(matches!(
        body.node(body.entry()).kind(),
        BlockKind::EntryDispatcher
    ));
    // one set vertex outside per original entry edge
    assert_eq!(
        count_kind(&region, |k| matches!(k, BlockKind::EntrySet { .. })),
        2
    );
    // internal re-entries also pass through set vertices, then continue
    assert_eq!(
        count_kind(body, |k| matches!(k, BlockKind::EntrySet { .. })),
        2
    );
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Continue)), 2);
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Break)), 1);

    // the state values are densely packed from zero
    let mut values: Vec<u64> = region
        .graph()
        .node_indices()
        .filter_map(|n| region.node(n).state_value())
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1]);
}

#[test]
fn multi_exit_loop_gets_an_exit_dispatcher() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1]),
            ("h", vec![2, 3]),
            ("t", vec![1, 4]),
            ("out1", vec![5]),
            ("out2", vec![5]),
            ("exit", vec![]),
        ],
    );
    let mut region = RegionCfg::from_source(&src).unwrap();
    region.comb().unwrap();

    assert_eq!(
        count_kind(&region, |k| matches!(k, BlockKind::ExitDispatcher)),
        1
    );
    let collapsed: Vec<_> = region
        .graph()
        .node_indices()
        .filter(|&n| matches!(region.node(n).kind(), BlockKind::Collapsed(_)))
        .collect();
    assert_eq!(collapsed.len(), 1);
    let body = region.node(collapsed[0]).collapsed_region().unwrap();
    assert_eq!(
        count_kind(body, |k| matches!(k, BlockKind::ExitSet { .. })),
        2
    );
    assert_eq!(count_kind(body, |k| matches!(k, BlockKind::Break)), 2);

    // the loop's unique successor is the dispatcher
    let succs: Vec<_> = region.graph().neighbors(collapsed[0]).collect();
    assert_eq!(succs.len(), 1);
    assert!(matches!(
        region.node(succs[0]).kind(),
        BlockKind::ExitDispatcher
    ));
}

#[test]
fn trivial_and_diamond_are_not_equivalent() {
    let trivial = RegionCfg::from_source(&VecSource::new(
        0,
        vec![("entry", vec![1]), ("exit", vec![])],
    ))
    .unwrap();
    let diamond = RegionCfg::from_source(&VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2]),
            ("a", vec![3]),
            ("b", vec![3]),
            ("join", vec![4]),
            ("exit", vec![]),
        ],
    ))
    .unwrap();
    assert!(!trivial.is_topologically_equivalent(&diamond));
    assert!(trivial.is_topologically_equivalent(&trivial.clone()));
}

#[test]
fn unreachable_vertices_are_dropped() {
    let src = VecSource::new(
        0,
        vec![("entry", vec![1]), ("exit", vec![]), ("island", vec![0])],
    );
    let region = RegionCfg::from_source(&src).unwrap();
    assert_eq!(region.graph().node_count(), 2);
}

#[test]
fn dangling_edge_is_malformed() {
    let src = VecSource::new(0, vec![("entry", vec![5]), ("exit", vec![])]);
    match RegionCfg::from_source(&src) {
        Err(StructureError::MalformedInput { .. }) => {}
        other => panic!("expected MalformedInput, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn out_of_range_entry_is_malformed() {
    let src = VecSource::new(7, vec![("entry", vec![1]), ("exit", vec![])]);
    assert!(matches!(
        RegionCfg::from_source(&src),
        Err(StructureError::MalformedInput { .. })
    ));
}
