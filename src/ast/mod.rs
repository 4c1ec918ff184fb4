//! The structured AST produced by the restructuring pipeline.
//!
//! Nodes live in a per-tree arena addressed by [`AstNodeId`]; ownership is
//! strictly parent to child, while `parent_switch`, `related` and
//! `computation` are non-owning back references kept valid by the tree's
//! lifetime. During building, nodes temporarily carry a hybrid `successor`
//! link to their postdominator; sequencing consumes those links into
//! [`AstKind::Sequence`] nodes, after which the tree is a plain tree.

pub mod context;

mod beautify;
mod builder;
#[cfg(test)]
mod test;

pub use self::beautify::beautify;
pub use self::builder::build;
pub use self::context::{AstContext, AstContextMut};

use crate::cfg::LabelSet;
use crate::error::{Result, StructureError};
use crate::expr::ExprRef;

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstNodeId(usize);

impl fmt::Debug for AstNodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for AstNodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LoopKind {
    WhileTrue,
    While,
    DoWhile,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DispatcherKind {
    NotDispatcher,
    Entry,
    Exit,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    /// labels activating this case; empty for the default case
    pub labels: LabelSet,
    pub body: AstNodeId,
}

pub enum AstKind<'cd, C: AstContext> {
    Code {
        implicit_return: bool,
    },
    Break {
        /// set when this break leaves the enclosing loop from inside a
        /// switch, which the emitter must dispatch explicitly
        from_switch: bool,
    },
    Continue {
        /// the loop condition this continue must re-evaluate, if any
        computation: Option<AstNodeId>,
        /// a continue in terminal position that the emitter may omit
        implicit: bool,
    },
    If {
        cond: ExprRef<'cd, C::Value>,
        then: Option<AstNodeId>,
        else_: Option<AstNodeId>,
        weaved: bool,
    },
    Scs {
        body: Option<AstNodeId>,
        loop_kind: LoopKind,
        /// back reference to the promoted loop condition for `While` and
        /// `DoWhile` loops
        related: Option<AstNodeId>,
    },
    Sequence {
        children: Vec<AstNodeId>,
    },
    Switch {
        /// the scrutinee; `None` exactly for dispatcher switches, whose
        /// scrutinee is the synthesized state variable
        cond: Option<C::Value>,
        cases: Vec<SwitchCase>,
        needs_state_var: bool,
        needs_loop_break_dispatcher: bool,
        weaved: bool,
        dispatcher: DispatcherKind,
    },
    SwitchBreak {
        /// weak back pointer to the enclosing switch
        parent: AstNodeId,
    },
    Set {
        value: u64,
        dispatcher: DispatcherKind,
    },
}

pub struct AstNode<'cd, C: AstContext> {
    id: AstNodeId,
    name: String,
    origin: Option<C::Block>,
    successor: Option<AstNodeId>,
    kind: AstKind<'cd, C>,
}

impl<'cd, C: AstContext> AstNode<'cd, C> {
    pub fn id(&self) -> AstNodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&C::Block> {
        self.origin.as_ref()
    }

    pub fn successor(&self) -> Option<AstNodeId> {
        self.successor
    }

    pub fn kind(&self) -> &AstKind<'cd, C> {
        &self.kind
    }
}

pub struct AstTree<'cd, C: AstContext> {
    nodes: Vec<AstNode<'cd, C>>,
    root: Option<AstNodeId>,
}

impl<'cd, C: AstContext> AstTree<'cd, C> {
    pub fn new() -> Self {
        AstTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        origin: Option<C::Block>,
        kind: AstKind<'cd, C>,
    ) -> AstNodeId {
        let id = AstNodeId(self.nodes.len());
        self.nodes.push(AstNode {
            id,
            name: name.into(),
            origin,
            successor: None,
            kind,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<AstNodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: AstNodeId) {
        self.root = Some(root);
    }

    /// Panics if `id` does not belong to this tree.
    pub fn node(&self, id: AstNodeId) -> &AstNode<'cd, C> {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: AstNodeId) -> &AstKind<'cd, C> {
        &self.nodes[id.0].kind
    }

    pub(crate) fn kind_mut(&mut self, id: AstNodeId) -> &mut AstKind<'cd, C> {
        &mut self.nodes[id.0].kind
    }

    pub(crate) fn set_successor(&mut self, id: AstNodeId, succ: Option<AstNodeId>) {
        self.nodes[id.0].successor = succ;
    }

    pub(crate) fn take_successor(&mut self, id: AstNodeId) -> Option<AstNodeId> {
        self.nodes[id.0].successor.take()
    }

    /// Structural children of `id` in order, the hybrid successor included;
    /// back references are not children.
    pub fn children(&self, id: AstNodeId) -> Vec<AstNodeId> {
        use self::AstKind::*;
        let mut out = Vec::new();
        match &self.nodes[id.0].kind {
            Code { .. } | Break { .. } | Continue { .. } | SwitchBreak { .. } | Set { .. } => {}
            If { then, else_, .. } => {
                out.extend(then.iter().copied());
                out.extend(else_.iter().copied());
            }
            Scs { body, .. } => out.extend(body.iter().copied()),
            Sequence { children } => out.extend(children.iter().copied()),
            Switch { cases, .. } => out.extend(cases.iter().map(|c| c.body)),
        }
        out.extend(self.nodes[id.0].successor.iter().copied());
        out
    }

    /// Nodes reachable from the root through child links, in preorder.
    pub fn reachable(&self) -> Vec<AstNodeId> {
        let mut out = Vec::new();
        let root = match self.root {
            Some(r) => r,
            None => return out,
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            out.push(id);
            let mut kids = self.children(id);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Structural equality: kinds, attribute fields and children; node
    /// identities and names are ignored. Back references compare by
    /// presence only.
    pub fn structural_eq(&self, a: AstNodeId, b: AstNodeId) -> bool {
        use self::AstKind::*;
        match (&self.nodes[a.0].kind, &self.nodes[b.0].kind) {
            (Code { implicit_return: l }, Code { implicit_return: r }) => l == r,
            (Break { from_switch: l }, Break { from_switch: r }) => l == r,
            (
                Continue {
                    computation: lc,
                    implicit: li,
                },
                Continue {
                    computation: rc,
                    implicit: ri,
                },
            ) => lc.is_some() == rc.is_some() && li == ri,
            (
                If {
                    cond: lc,
                    then: lt,
                    else_: le,
                    weaved: lw,
                },
                If {
                    cond: rc,
                    then: rt,
                    else_: re,
                    weaved: rw,
                },
            ) => lc == rc && lw == rw && self.eq_opt(*lt, *rt) && self.eq_opt(*le, *re),
            (
                Scs {
                    body: lb,
                    loop_kind: lk,
                    related: lr,
                },
                Scs {
                    body: rb,
                    loop_kind: rk,
                    related: rr,
                },
            ) => lk == rk && lr.is_some() == rr.is_some() && self.eq_opt(*lb, *rb),
            (Sequence { children: l }, Sequence { children: r }) => {
                l.len() == r.len()
                    && l.iter().zip(r).all(|(&x, &y)| self.structural_eq(x, y))
            }
            (
                Switch {
                    cond: lc,
                    cases: lcs,
                    needs_state_var: lv,
                    needs_loop_break_dispatcher: ld,
                    weaved: lw,
                    dispatcher: lk,
                },
                Switch {
                    cond: rc,
                    cases: rcs,
                    needs_state_var: rv,
                    needs_loop_break_dispatcher: rd,
                    weaved: rw,
                    dispatcher: rk,
                },
            ) => {
                lc.is_some() == rc.is_some()
                    && lv == rv
                    && ld == rd
                    && lw == rw
                    && lk == rk
                    && lcs.len() == rcs.len()
                    && lcs.iter().zip(rcs).all(|(x, y)| {
                        x.labels == y.labels && self.structural_eq(x.body, y.body)
                    })
            }
            (SwitchBreak { .. }, SwitchBreak { .. }) => true,
            (
                Set {
                    value: lv,
                    dispatcher: ld,
                },
                Set {
                    value: rv,
                    dispatcher: rd,
                },
            ) => lv == rv && ld == rd,
            _ => false,
        }
    }

    fn eq_opt(&self, a: Option<AstNodeId>, b: Option<AstNodeId>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.structural_eq(a, b),
            _ => false,
        }
    }

    /// Deep copy of the subtree rooted at `id` with fresh node identities.
    /// Returns the new root and the old-to-new substitution map; back
    /// references into the copied subtree are retargeted through the map,
    /// while ones pointing outside it are left alone.
    pub fn clone_subtree(&mut self, id: AstNodeId) -> (AstNodeId, HashMap<AstNodeId, AstNodeId>) {
        let mut map = HashMap::new();
        let new_root = self.clone_rec(id, &mut map);
        let cloned: Vec<AstNodeId> = map.values().copied().collect();
        for cid in cloned {
            use self::AstKind::*;
            match &mut self.nodes[cid.0].kind {
                Continue { computation, .. } => remap_opt(&map, computation),
                Scs { related, .. } => remap_opt(&map, related),
                SwitchBreak { parent } => remap(&map, parent),
                _ => {}
            }
        }
        (new_root, map)
    }

    fn clone_rec(&mut self, id: AstNodeId, map: &mut HashMap<AstNodeId, AstNodeId>) -> AstNodeId {
        use self::AstKind::*;
        let (name, origin, successor) = {
            let n = &self.nodes[id.0];
            (n.name.clone(), n.origin.clone(), n.successor)
        };
        let shallow = self.nodes[id.0].kind.clone();
        let kind = match shallow {
            Code { .. } | Break { .. } | Continue { .. } | SwitchBreak { .. } | Set { .. } => {
                shallow
            }
            If {
                cond,
                then,
                else_,
                weaved,
            } => If {
                cond,
                then: then.map(|t| self.clone_rec(t, map)),
                else_: else_.map(|e| self.clone_rec(e, map)),
                weaved,
            },
            Scs {
                body,
                loop_kind,
                related,
            } => Scs {
                body: body.map(|b| self.clone_rec(b, map)),
                loop_kind,
                related,
            },
            Sequence { children } => Sequence {
                children: children
                    .into_iter()
                    .map(|c| self.clone_rec(c, map))
                    .collect(),
            },
            Switch {
                cond,
                cases,
                needs_state_var,
                needs_loop_break_dispatcher,
                weaved,
                dispatcher,
            } => Switch {
                cond,
                cases: cases
                    .into_iter()
                    .map(|c| SwitchCase {
                        labels: c.labels,
                        body: self.clone_rec(c.body, map),
                    })
                    .collect(),
                needs_state_var,
                needs_loop_break_dispatcher,
                weaved,
                dispatcher,
            },
        };
        let new_id = self.add(name, origin, kind);
        let new_succ = successor.map(|s| self.clone_rec(s, map));
        self.nodes[new_id.0].successor = new_succ;
        map.insert(id, new_id);
        new_id
    }

    /// Rewrites every reference held by any node through the substitution
    /// map, the root included.
    pub fn update_references(&mut self, map: &HashMap<AstNodeId, AstNodeId>) {
        use self::AstKind::*;
        if map.is_empty() {
            return;
        }
        for node in &mut self.nodes {
            if let Some(s) = &mut node.successor {
                remap(map, s);
            }
            match &mut node.kind {
                If { then, else_, .. } => {
                    remap_opt(map, then);
                    remap_opt(map, else_);
                }
                Scs { body, related, .. } => {
                    remap_opt(map, body);
                    remap_opt(map, related);
                }
                Continue { computation, .. } => remap_opt(map, computation),
                Sequence { children } => {
                    for c in children {
                        remap(map, c);
                    }
                }
                Switch { cases, .. } => {
                    for c in cases {
                        remap(map, &mut c.body);
                    }
                }
                SwitchBreak { parent } => remap(map, parent),
                Code { .. } | Break { .. } | Set { .. } => {}
            }
        }
        if let Some(r) = &mut self.root {
            remap(map, r);
        }
    }

    /// Collapses chains of hybrid `successor` links into `Sequence` nodes.
    /// Returns the replacement for `root`; afterwards no node reachable
    /// from it has a successor link.
    pub(crate) fn build_sequences(&mut self, root: AstNodeId) -> AstNodeId {
        self.seq_rec(root)
    }

    fn seq_rec(&mut self, id: AstNodeId) -> AstNodeId {
        self.seq_children(id);
        if self.nodes[id.0].successor.is_none() {
            return id;
        }
        let mut chain = Vec::new();
        let mut cur = self.take_successor(id);
        self.push_flat(&mut chain, id);
        while let Some(s) = cur {
            self.seq_children(s);
            cur = self.take_successor(s);
            self.push_flat(&mut chain, s);
        }
        self.add("sequence", None, AstKind::Sequence { children: chain })
    }

    fn seq_children(&mut self, id: AstNodeId) {
        use self::AstKind::*;
        match &self.nodes[id.0].kind {
            If { then, else_, .. } => {
                let (t, e) = (*then, *else_);
                let t = t.map(|t| self.seq_rec(t));
                let e = e.map(|e| self.seq_rec(e));
                if let If { then, else_, .. } = &mut self.nodes[id.0].kind {
                    *then = t;
                    *else_ = e;
                }
            }
            Scs { body, .. } => {
                let b = *body;
                let b = b.map(|b| self.seq_rec(b));
                if let Scs { body, .. } = &mut self.nodes[id.0].kind {
                    *body = b;
                }
            }
            Sequence { children } => {
                let kids = children.clone();
                let kids: Vec<_> = kids.into_iter().map(|c| self.seq_rec(c)).collect();
                if let Sequence { children } = &mut self.nodes[id.0].kind {
                    *children = kids;
                }
            }
            Switch { cases, .. } => {
                let bodies: Vec<_> = cases.iter().map(|c| c.body).collect();
                let bodies: Vec<_> = bodies.into_iter().map(|b| self.seq_rec(b)).collect();
                if let Switch { cases, .. } = &mut self.nodes[id.0].kind {
                    for (c, b) in cases.iter_mut().zip(bodies) {
                        c.body = b;
                    }
                }
            }
            _ => {}
        }
    }

    fn push_flat(&mut self, chain: &mut Vec<AstNodeId>, id: AstNodeId) {
        if let AstKind::Sequence { children } = &self.nodes[id.0].kind {
            chain.extend(children.clone());
        } else {
            chain.push(id);
        }
    }

    /// Whether the subtree at `id` contains a `Break` that would leave the
    /// enclosing loop. Nested loops swallow their own breaks; hybrid
    /// successor chains are followed.
    pub(crate) fn contains_loop_break(&self, id: AstNodeId) -> bool {
        use self::AstKind::*;
        let direct = match &self.nodes[id.0].kind {
            Break { .. } => true,
            Scs { .. } => false,
            If { then, else_, .. } => {
                then.map_or(false, |t| self.contains_loop_break(t))
                    || else_.map_or(false, |e| self.contains_loop_break(e))
            }
            Sequence { children } => children.iter().any(|&c| self.contains_loop_break(c)),
            Switch { cases, .. } => cases.iter().any(|c| self.contains_loop_break(c.body)),
            _ => false,
        };
        direct
            || self.nodes[id.0]
                .successor
                .map_or(false, |s| self.contains_loop_break(s))
    }

    /// Marks every `Break` found by the [`Self::contains_loop_break`]
    /// descent as breaking from within a switch.
    pub(crate) fn mark_breaks_from_switch(&mut self, id: AstNodeId) {
        use self::AstKind::*;
        match &mut self.nodes[id.0].kind {
            Break { from_switch } => *from_switch = true,
            Scs { .. } => return,
            _ => {}
        }
        let kids: Vec<AstNodeId> = match &self.nodes[id.0].kind {
            If { then, else_, .. } => then.iter().chain(else_.iter()).copied().collect(),
            Sequence { children } => children.clone(),
            Switch { cases, .. } => cases.iter().map(|c| c.body).collect(),
            _ => Vec::new(),
        };
        for k in kids {
            self.mark_breaks_from_switch(k);
        }
        if let Some(s) = self.nodes[id.0].successor {
            self.mark_breaks_from_switch(s);
        }
    }

    /// Checks the structural invariants of a finished tree.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .root
            .ok_or_else(|| StructureError::invariant("tree", "tree has no root"))?;
        self.validate_rec(root, &mut Vec::new(), false)
    }

    fn validate_rec(
        &self,
        id: AstNodeId,
        switches: &mut Vec<AstNodeId>,
        in_loop: bool,
    ) -> Result<()> {
        use self::AstKind::*;
        let node = &self.nodes[id.0];
        if node.successor.is_some() {
            return Err(StructureError::invariant(
                id.to_string(),
                "hybrid successor link survived sequencing",
            ));
        }
        match &node.kind {
            Code { .. } | Set { .. } => Ok(()),
            Break { .. } => {
                if in_loop {
                    Ok(())
                } else {
                    Err(StructureError::invariant(
                        id.to_string(),
                        "break without an enclosing loop",
                    ))
                }
            }
            Continue { .. } => {
                if in_loop {
                    Ok(())
                } else {
                    Err(StructureError::invariant(
                        id.to_string(),
                        "continue without an enclosing loop",
                    ))
                }
            }
            SwitchBreak { parent } => {
                if switches.contains(parent) {
                    Ok(())
                } else {
                    Err(StructureError::invariant(
                        id.to_string(),
                        "switch break without a reachable enclosing switch",
                    ))
                }
            }
            If { then, else_, .. } => {
                if let Some(t) = then {
                    self.validate_rec(*t, switches, in_loop)?;
                }
                if let Some(e) = else_ {
                    self.validate_rec(*e, switches, in_loop)?;
                }
                Ok(())
            }
            Scs {
                body,
                loop_kind,
                related,
            } => {
                if *loop_kind != LoopKind::WhileTrue && related.is_none() {
                    return Err(StructureError::invariant(
                        id.to_string(),
                        "promoted loop without a related condition",
                    ));
                }
                let body = body.ok_or_else(|| {
                    StructureError::invariant(id.to_string(), "loop with no body")
                })?;
                // a loop boundary resets the switch scope
                self.validate_rec(body, &mut Vec::new(), true)
            }
            Sequence { children } => {
                for &c in children {
                    self.validate_rec(c, switches, in_loop)?;
                }
                Ok(())
            }
            Switch { cases, .. } => {
                let defaults = cases.iter().filter(|c| c.labels.is_empty()).count();
                if defaults > 1 {
                    return Err(StructureError::invariant(
                        id.to_string(),
                        "switch with more than one default case",
                    ));
                }
                switches.push(id);
                for c in cases {
                    self.validate_rec(c.body, switches, in_loop)?;
                }
                switches.pop();
                Ok(())
            }
        }
    }

    /// Writes the tree as a GraphViz digraph for debugging.
    pub fn to_dot(&self) -> String {
        use self::AstKind::*;
        let mut out = String::new();
        out.push_str("digraph ast {\n");
        for id in self.reachable() {
            let node = &self.nodes[id.0];
            let label = match &node.kind {
                Code { implicit_return } => {
                    if *implicit_return {
                        "code (implicit return)".to_owned()
                    } else {
                        "code".to_owned()
                    }
                }
                Break { .. } => "break".to_owned(),
                Continue { implicit, .. } => {
                    if *implicit {
                        "continue (implicit)".to_owned()
                    } else {
                        "continue".to_owned()
                    }
                }
                If { weaved, .. } => {
                    if *weaved {
                        "if (weaved)".to_owned()
                    } else {
                        "if".to_owned()
                    }
                }
                Scs { loop_kind, .. } => format!("loop {:?}", loop_kind),
                Sequence { .. } => "sequence".to_owned(),
                Switch { dispatcher, .. } => format!("switch {:?}", dispatcher),
                SwitchBreak { .. } => "switch break".to_owned(),
                Set { value, .. } => format!("set {}", value),
            };
            writeln!(out, "  {} [label=\"{} {}\"];", id, label, node.name).unwrap();
            for c in self.children(id) {
                writeln!(out, "  {} -> {};", id, c).unwrap();
            }
            match &node.kind {
                Scs {
                    related: Some(r), ..
                } => writeln!(out, "  {} -> {} [style=dashed];", id, r).unwrap(),
                SwitchBreak { parent } => {
                    writeln!(out, "  {} -> {} [style=dashed];", id, parent).unwrap()
                }
                _ => {}
            }
        }
        out.push_str("}\n");
        out
    }
}

impl<'cd, C: AstContext> Default for AstTree<'cd, C> {
    fn default() -> Self {
        Self::new()
    }
}

fn remap(map: &HashMap<AstNodeId, AstNodeId>, id: &mut AstNodeId) {
    if let Some(&n) = map.get(id) {
        *id = n;
    }
}

fn remap_opt(map: &HashMap<AstNodeId, AstNodeId>, id: &mut Option<AstNodeId>) {
    if let Some(i) = id {
        remap(map, i);
    }
}

// manual impl: `#[derive(Clone)]` would require `C: Clone`
impl<'cd, C: AstContext> Clone for AstKind<'cd, C> {
    fn clone(&self) -> Self {
        use self::AstKind::*;
        match self {
            Code { implicit_return } => Code {
                implicit_return: *implicit_return,
            },
            Break { from_switch } => Break {
                from_switch: *from_switch,
            },
            Continue {
                computation,
                implicit,
            } => Continue {
                computation: *computation,
                implicit: *implicit,
            },
            If {
                cond,
                then,
                else_,
                weaved,
            } => If {
                cond: *cond,
                then: *then,
                else_: *else_,
                weaved: *weaved,
            },
            Scs {
                body,
                loop_kind,
                related,
            } => Scs {
                body: *body,
                loop_kind: *loop_kind,
                related: *related,
            },
            Sequence { children } => Sequence {
                children: children.clone(),
            },
            Switch {
                cond,
                cases,
                needs_state_var,
                needs_loop_break_dispatcher,
                weaved,
                dispatcher,
            } => Switch {
                cond: cond.clone(),
                cases: cases.clone(),
                needs_state_var: *needs_state_var,
                needs_loop_break_dispatcher: *needs_loop_break_dispatcher,
                weaved: *weaved,
                dispatcher: *dispatcher,
            },
            SwitchBreak { parent } => SwitchBreak { parent: *parent },
            Set { value, dispatcher } => Set {
                value: *value,
                dispatcher: *dispatcher,
            },
        }
    }
}
