use super::*;
use crate::cfg::{CfgSource, LabelSet};
use crate::expr;

use std::collections::HashMap as Map;

#[derive(Default, Debug)]
struct StringCtx;

impl AstContext for StringCtx {
    type Block = String;
    type Value = String;

    fn branch_condition(&self, block: &String) -> Option<String> {
        Some(format!("c_{}", block))
    }

    fn switch_value(&self, block: &String) -> Option<String> {
        Some(format!("v_{}", block))
    }

    fn is_return_block(&self, block: &String) -> bool {
        block.starts_with("ret")
    }
}

impl AstContextMut for StringCtx {
    fn mk_state_eq(&mut self, kind: DispatcherKind, val: u64) -> String {
        format!("{:?}_state == {}", kind, val)
    }

    fn mk_label_const(&mut self, val: u64) -> String {
        val.to_string()
    }
}

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

fn origin_of<'cd>(tree: &'cd AstTree<'cd, StringCtx>, id: AstNodeId) -> Option<&'cd str> {
    tree.node(id).origin().map(|s| s.as_str())
}

fn seq_children<'cd>(tree: &AstTree<'cd, StringCtx>, id: AstNodeId) -> Vec<AstNodeId> {
    match tree.kind(id) {
        AstKind::Sequence { children } => children.clone(),
        other => panic!("expected a sequence, got {:?} node", kind_name(other)),
    }
}

fn kind_name<'cd>(kind: &AstKind<'cd, StringCtx>) -> &'static str {
    match kind {
        AstKind::Code { .. } => "code",
        AstKind::Break { .. } => "break",
        AstKind::Continue { .. } => "continue",
        AstKind::If { .. } => "if",
        AstKind::Scs { .. } => "loop",
        AstKind::Sequence { .. } => "sequence",
        AstKind::Switch { .. } => "switch",
        AstKind::SwitchBreak { .. } => "switch break",
        AstKind::Set { .. } => "set",
    }
}

#[test]
fn trivial_graph_becomes_a_sequence() {
    let src = VecSource::new(0, vec![("entry", vec![1]), ("exit", vec![])]);
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let children = seq_children(&tree, tree.root().unwrap());
    assert_eq!(children.len(), 2);
    assert_eq!(origin_of(&tree, children[0]), Some("entry"));
    assert_eq!(origin_of(&tree, children[1]), Some("exit"));
    // sequencing consumed every hybrid link
    assert!(tree
        .reachable()
        .iter()
        .all(|&n| tree.node(n).successor().is_none()));
}

#[test]
fn diamond_becomes_if_then_else() {
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
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let children = seq_children(&tree, tree.root().unwrap());
    assert_eq!(children.len(), 3);
    match tree.kind(children[0]) {
        AstKind::If {
            cond,
            then: Some(t),
            else_: Some(e),
            weaved: false,
        } => {
            assert_eq!(cond.atomic_value().map(String::as_str), Some("c_entry"));
            assert_eq!(origin_of(&tree, *t), Some("a"));
            assert_eq!(origin_of(&tree, *e), Some("b"));
        }
        other => panic!("expected an if, got {:?}", kind_name(other)),
    }
    assert_eq!(origin_of(&tree, children[1]), Some("join"));
    assert_eq!(origin_of(&tree, children[2]), Some("exit"));
}

#[test]
fn post_checked_loop_becomes_do_while() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1]),
            ("body", vec![2]),
            ("check", vec![1, 3]),
            ("ret_exit", vec![]),
        ],
    );
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let children = seq_children(&tree, tree.root().unwrap());
    assert_eq!(children.len(), 3);
    match tree.kind(children[1]) {
        AstKind::Scs {
            body: Some(b),
            loop_kind: LoopKind::DoWhile,
            related: Some(r),
        } => {
            // the terminal check left the body and became the condition
            assert_eq!(origin_of(&tree, *b), Some("body"));
            match tree.kind(*r) {
                AstKind::If { cond, .. } => {
                    assert_eq!(cond.atomic_value().map(String::as_str), Some("c_check"));
                }
                other => panic!("expected an if, got {:?}", kind_name(other)),
            }
        }
        other => panic!("expected a do-while, got {:?}", kind_name(other)),
    }
    // the final return needs no explicit return statement
    match tree.kind(children[2]) {
        AstKind::Code { implicit_return } => assert!(implicit_return),
        other => panic!("expected code, got {:?}", kind_name(other)),
    }
}

#[test]
fn pre_checked_loop_becomes_while() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1]),
            ("check", vec![2, 3]),
            ("body", vec![1]),
            ("exit", vec![]),
        ],
    );
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let children = seq_children(&tree, tree.root().unwrap());
    assert_eq!(children.len(), 3);
    match tree.kind(children[1]) {
        AstKind::Scs {
            body: Some(b),
            loop_kind: LoopKind::While,
            related: Some(r),
        } => {
            match tree.kind(*r) {
                AstKind::If { cond, .. } => {
                    assert_eq!(cond.atomic_value().map(String::as_str), Some("c_check"));
                }
                other => panic!("expected an if, got {:?}", kind_name(other)),
            }
            // the break arm is gone; the body keeps its code and an
            // implicit trailing continue
            let body = seq_children(&tree, *b);
            assert_eq!(body.len(), 2);
            assert_eq!(origin_of(&tree, body[0]), Some("body"));
            match tree.kind(body[1]) {
                AstKind::Continue { implicit, .. } => assert!(implicit),
                other => panic!("expected a continue, got {:?}", kind_name(other)),
            }
        }
        other => panic!("expected a while, got {:?}", kind_name(other)),
    }
}

#[test]
fn two_entry_loop_dispatcher_folds_into_an_if() {
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
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    // no dispatcher switch survives beautification
    let reachable = tree.reachable();
    assert!(reachable.iter().all(|&n| !matches!(
        tree.kind(n),
        AstKind::Switch {
            dispatcher: DispatcherKind::Entry,
            ..
        } | AstKind::Switch {
            dispatcher: DispatcherKind::Exit,
            ..
        }
    )));

    // the loop is still endless and its body opens on the promoted if
    let scs: Vec<_> = reachable
        .iter()
        .filter(|&&n| matches!(tree.kind(n), AstKind::Scs { .. }))
        .collect();
    assert_eq!(scs.len(), 1);
    match tree.kind(*scs[0]) {
        AstKind::Scs {
            body: Some(b),
            loop_kind: LoopKind::WhileTrue,
            ..
        } => match tree.kind(*b) {
            AstKind::If { cond, .. } => {
                let c = cond.atomic_value().map(String::as_str).unwrap();
                assert!(c.contains("state == 0"), "unexpected condition {}", c);
            }
            other => panic!("expected an if, got {:?}", kind_name(other)),
        },
        other => panic!("expected a while-true, got {:?}", kind_name(other)),
    }

    // set vertices survive as Set nodes carrying the packed state values
    let mut sets: Vec<u64> = reachable
        .iter()
        .filter_map(|&n| match tree.kind(n) {
            AstKind::Set { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    sets.sort_unstable();
    assert_eq!(sets.first(), Some(&0));
}

#[test]
fn switch_cases_end_in_switch_breaks() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1, 2, 3]),
            ("a", vec![4]),
            ("b", vec![4]),
            ("c", vec![4]),
            ("join", vec![5]),
            ("exit", vec![]),
        ],
    )
    .with_labels(0, vec![vec![10], vec![20], vec![]]);
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let children = seq_children(&tree, tree.root().unwrap());
    let (switch, cases) = match tree.kind(children[0]) {
        AstKind::Switch {
            cond: Some(c),
            cases,
            dispatcher: DispatcherKind::NotDispatcher,
            ..
        } => {
            assert_eq!(c, "v_entry");
            (children[0], cases.clone())
        }
        other => panic!("expected a switch, got {:?}", kind_name(other)),
    };
    assert_eq!(cases.len(), 3);
    // cases are ordered by label, the default last
    assert!(cases[0].labels.contains(&10));
    assert!(cases[1].labels.contains(&20));
    assert!(cases[2].labels.is_empty());
    for case in &cases {
        let parts = seq_children(&tree, case.body);
        match tree.kind(*parts.last().unwrap()) {
            AstKind::SwitchBreak { parent } => assert_eq!(*parent, switch),
            other => panic!("expected a switch break, got {:?}", kind_name(other)),
        }
    }
}

#[test]
fn dual_switch_simplifies_to_if_and_keeps_weaved() {
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let mut tree: AstTree<StringCtx> = AstTree::new();
    let a = tree.add(
        "a",
        Some("A".to_owned()),
        AstKind::Code {
            implicit_return: false,
        },
    );
    let b = tree.add(
        "b",
        Some("B".to_owned()),
        AstKind::Code {
            implicit_return: false,
        },
    );
    let mut labels = LabelSet::new();
    labels.insert(3);
    let sw = tree.add(
        "sw",
        Some("SW".to_owned()),
        AstKind::Switch {
            cond: Some("v".to_owned()),
            cases: vec![
                SwitchCase { labels, body: a },
                SwitchCase {
                    labels: LabelSet::new(),
                    body: b,
                },
            ],
            needs_state_var: false,
            needs_loop_break_dispatcher: false,
            weaved: true,
            dispatcher: DispatcherKind::NotDispatcher,
        },
    );
    tree.set_root(sw);

    beautify(&mut tree, store.ectx(), &mut actx).unwrap();

    let root = tree.root().unwrap();
    assert_ne!(root, sw);
    match tree.kind(root) {
        AstKind::If {
            cond,
            then: Some(t),
            else_: Some(e),
            weaved,
        } => {
            assert!(*weaved);
            assert!(!cond.is_atomic());
            assert_eq!(origin_of(&tree, *t), Some("A"));
            assert_eq!(origin_of(&tree, *e), Some("B"));
        }
        other => panic!("expected an if, got {:?}", kind_name(other)),
    }
    // substitution closure: nothing reachable still refers to the switch
    assert!(!tree.reachable().contains(&sw));
}

#[test]
fn clone_is_structurally_equal_and_shares_no_identities() {
    let store: expr::Storage<String> = expr::Storage::new();
    let ectx = store.ectx();
    let mut tree: AstTree<StringCtx> = AstTree::new();

    let code = tree.add(
        "code",
        Some("X".to_owned()),
        AstKind::Code {
            implicit_return: false,
        },
    );
    let brk = tree.add("case", None, AstKind::Code { implicit_return: false });
    let mut labels = LabelSet::new();
    labels.insert(1);
    let sw = tree.add(
        "sw",
        None,
        AstKind::Switch {
            cond: Some("v".to_owned()),
            cases: vec![SwitchCase { labels, body: brk }],
            needs_state_var: false,
            needs_loop_break_dispatcher: false,
            weaved: false,
            dispatcher: DispatcherKind::NotDispatcher,
        },
    );
    let sb = tree.add("switch break", None, AstKind::SwitchBreak { parent: sw });
    if let AstKind::Switch { cases, .. } = tree.kind_mut(sw) {
        cases[0].body = sb;
    }
    let cond = ectx.mk_atomic("c".to_owned());
    let iff = tree.add(
        "if",
        None,
        AstKind::If {
            cond,
            then: Some(sw),
            else_: None,
            weaved: false,
        },
    );
    let root = tree.add(
        "sequence",
        None,
        AstKind::Sequence {
            children: vec![code, iff],
        },
    );
    tree.set_root(root);

    let (copy, map) = tree.clone_subtree(root);
    assert!(tree.structural_eq(root, copy));
    for (&old, &new) in &map {
        assert_ne!(old, new);
    }
    // the copied switch break points at the copied switch
    let copied_sb = map[&sb];
    match tree.kind(copied_sb) {
        AstKind::SwitchBreak { parent } => assert_eq!(*parent, map[&sw]),
        other => panic!("expected a switch break, got {:?}", kind_name(other)),
    }
    // the original still points at the original
    match tree.kind(sb) {
        AstKind::SwitchBreak { parent } => assert_eq!(*parent, sw),
        other => panic!("expected a switch break, got {:?}", kind_name(other)),
    }
}

#[test]
fn beautification_is_idempotent() {
    let src = VecSource::new(
        0,
        vec![
            ("entry", vec![1]),
            ("body", vec![2]),
            ("check", vec![1, 3]),
            ("ret_exit", vec![]),
        ],
    );
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let mut tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let root = tree.root().unwrap();
    let (snapshot, _) = tree.clone_subtree(root);
    beautify(&mut tree, store.ectx(), &mut actx).unwrap();
    assert!(tree.structural_eq(tree.root().unwrap(), snapshot));
}

#[test]
fn dot_dump_covers_the_tree() {
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
    let store: expr::Storage<String> = expr::Storage::new();
    let mut actx = StringCtx::default();
    let tree = crate::restructure(&src, store.ectx(), &mut actx).unwrap();

    let dump = tree.to_dot();
    assert!(dump.starts_with("digraph"));
    assert!(dump.contains("sequence"));
    assert!(dump.contains("if"));
    // one line per reachable node
    for id in tree.reachable() {
        assert!(dump.contains(&format!("{} [label=", id)));
    }
}

#[test]
fn at_most_one_default_is_enforced() {
    let mut tree: AstTree<StringCtx> = AstTree::new();
    let a = tree.add("a", None, AstKind::Code { implicit_return: false });
    let b = tree.add("b", None, AstKind::Code { implicit_return: false });
    let sw = tree.add(
        "sw",
        None,
        AstKind::Switch {
            cond: Some("v".to_owned()),
            cases: vec![
                SwitchCase {
                    labels: LabelSet::new(),
                    body: a,
                },
                SwitchCase {
                    labels: LabelSet::new(),
                    body: b,
                },
            ],
            needs_state_var: false,
            needs_loop_break_dispatcher: false,
            weaved: false,
            dispatcher: DispatcherKind::NotDispatcher,
        },
    );
    tree.set_root(sw);
    assert!(matches!(
        tree.validate(),
        Err(crate::StructureError::InvariantViolation { .. })
    ));
}
