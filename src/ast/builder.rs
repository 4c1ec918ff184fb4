//! Lifts a combed region hierarchy into an AST.
//!
//! The builder walks a region from its entry, following the postdominator
//! tree: a conditional's branches are built up to its immediate
//! postdominator, which then becomes the node's hybrid `successor`. Loop
//! bodies recurse into their collapsed region; `Break` and `Continue`
//! marker vertices become the structured jump leaves.

use super::context::AstContextMut;
use super::{AstKind, AstNodeId, AstTree, DispatcherKind, LoopKind, SwitchCase};
use crate::cfg::dom::DomInfo;
use crate::cfg::{BlockKind, CfgEdge, LabelSet, RegionCfg};
use crate::error::{Result, StructureError};
use crate::expr::ExprContext;

use log::debug;
use petgraph::prelude::*;

pub fn build<'cd, C: AstContextMut>(
    region: &RegionCfg<C::Block>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<AstTree<'cd, C>> {
    let mut tree = AstTree::new();
    let root = build_region(region, &mut tree, ectx, actx)?;
    let root = tree.build_sequences(root);
    tree.set_root(root);
    debug!("built AST of {} nodes", tree.len());
    if cfg!(debug_assertions) {
        tree.validate()?;
    }
    Ok(tree)
}

fn build_region<'cd, C: AstContextMut>(
    region: &RegionCfg<C::Block>,
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<AstNodeId> {
    let exit = region.exit().ok_or_else(|| {
        StructureError::invariant("region", "combed region has no exit vertex")
    })?;
    let dom = DomInfo::compute(region.graph(), region.entry(), exit);
    let mut builder = RegionBuilder {
        region,
        dom,
        tree,
        ectx,
        actx,
    };
    builder
        .build_between(region.entry(), None, None)?
        .ok_or_else(|| StructureError::invariant("region", "region produced no AST"))
}

/// The nearest enclosing switch during a build: its postdominator boundary
/// and its node, so edges that leave it become `SwitchBreak`s.
type SwitchScope = Option<(NodeIndex, AstNodeId)>;

struct RegionBuilder<'a, 'cd, C: AstContextMut> {
    region: &'a RegionCfg<C::Block>,
    dom: DomInfo,
    tree: &'a mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &'a mut C,
}

impl<'a, 'cd, C: AstContextMut> RegionBuilder<'a, 'cd, C> {
    /// Builds the chain starting at `start`, stopping (exclusively) at
    /// `stop`. Reaching the virtual exit ends the chain; reaching the
    /// postdominator of the switch in `sw` emits a `SwitchBreak` instead.
    fn build_between(
        &mut self,
        start: NodeIndex,
        stop: Option<NodeIndex>,
        sw: SwitchScope,
    ) -> Result<Option<AstNodeId>> {
        let region = self.region;
        if matches!(region.node(start).kind(), BlockKind::Tile) {
            return Ok(None);
        }
        if let Some((boundary, switch)) = sw {
            if boundary == start {
                let id = self
                    .tree
                    .add("switch break", None, AstKind::SwitchBreak { parent: switch });
                return Ok(Some(id));
            }
        }
        if Some(start) == stop {
            return Ok(None);
        }

        let edges = region.out_edges(start);
        match region.node(start).kind() {
            BlockKind::Collapsed(body) => self.build_loop(start, body, &edges, stop, sw),
            BlockKind::EntryDispatcher | BlockKind::ExitDispatcher => {
                self.build_switch(start, edges, stop, sw)
            }
            BlockKind::Code(_) => {
                if edges.iter().any(|(w, _)| matches!(w, CfgEdge::Case(_))) {
                    self.build_switch(start, edges, stop, sw)
                } else if edges.len() == 2 {
                    self.build_if(start, &edges, stop, sw)
                } else {
                    self.build_linear(start, &edges, stop, sw)
                }
            }
            _ => self.build_linear(start, &edges, stop, sw),
        }
    }

    /// A vertex with at most one successor becomes a leaf node chained to
    /// whatever follows it.
    fn build_linear(
        &mut self,
        v: NodeIndex,
        edges: &[(CfgEdge, NodeIndex)],
        stop: Option<NodeIndex>,
        sw: SwitchScope,
    ) -> Result<Option<AstNodeId>> {
        let region = self.region;
        let node = region.node(v);
        if edges.len() > 1 {
            return Err(StructureError::unexpected(
                node.name(),
                "vertex with several successors outside a conditional or switch",
            ));
        }
        let (kind, origin) = match node.kind() {
            BlockKind::Code(b) => (
                AstKind::Code {
                    implicit_return: false,
                },
                Some(b.clone()),
            ),
            BlockKind::Empty => (
                AstKind::Code {
                    implicit_return: false,
                },
                None,
            ),
            BlockKind::Break => (AstKind::Break { from_switch: false }, None),
            BlockKind::Continue => (
                AstKind::Continue {
                    computation: None,
                    implicit: false,
                },
                None,
            ),
            BlockKind::EntrySet { value } => (
                AstKind::Set {
                    value: *value,
                    dispatcher: DispatcherKind::Entry,
                },
                None,
            ),
            BlockKind::ExitSet { value } => (
                AstKind::Set {
                    value: *value,
                    dispatcher: DispatcherKind::Exit,
                },
                None,
            ),
            other => {
                return Err(StructureError::unexpected(
                    node.name(),
                    format!("{:?} vertex in a linear position", other),
                ))
            }
        };
        let id = self.tree.add(node.name(), origin, kind);
        if let Some(&(_, succ)) = edges.first() {
            let s = self.build_between(succ, stop, sw)?;
            self.tree.set_successor(id, s);
        }
        Ok(Some(id))
    }

    /// A two-way branch: both arms are built up to the branch's immediate
    /// postdominator, which becomes the hybrid successor.
    fn build_if(
        &mut self,
        v: NodeIndex,
        edges: &[(CfgEdge, NodeIndex)],
        stop: Option<NodeIndex>,
        sw: SwitchScope,
    ) -> Result<Option<AstNodeId>> {
        let region = self.region;
        let node = region.node(v);
        let block = node.block().ok_or_else(|| {
            StructureError::unexpected(node.name(), "branching vertex without a code block")
        })?;
        let t = edges
            .iter()
            .find(|(w, _)| *w == CfgEdge::True)
            .map(|&(_, t)| t);
        let f = edges
            .iter()
            .find(|(w, _)| *w == CfgEdge::False)
            .map(|&(_, t)| t);
        let (t, f) = match (t, f) {
            (Some(t), Some(f)) => (t, f),
            _ => {
                return Err(StructureError::unexpected(
                    node.name(),
                    "two-way branch without true/false edges",
                ))
            }
        };
        let cond_val = self.actx.branch_condition(block).ok_or_else(|| {
            StructureError::unexpected(node.name(), "branching block without a condition value")
        })?;
        let cond = self.ectx.mk_atomic(cond_val);

        let p = self.dom.ipdom(v).ok_or_else(|| {
            StructureError::invariant(node.name(), "conditional without a postdominator")
        })?;
        let then = self.build_between(t, Some(p), sw)?;
        let else_ = self.build_between(f, Some(p), sw)?;
        let id = self.tree.add(
            node.name(),
            Some(block.clone()),
            AstKind::If {
                cond,
                then,
                else_,
                weaved: node.is_weaved(),
            },
        );
        let s = self.build_between(p, stop, sw)?;
        self.tree.set_successor(id, s);
        Ok(Some(id))
    }

    /// A switch or dispatcher: every case is built up to the common
    /// postdominator; edges reaching it become `SwitchBreak` leaves.
    fn build_switch(
        &mut self,
        v: NodeIndex,
        edges: Vec<(CfgEdge, NodeIndex)>,
        stop: Option<NodeIndex>,
        sw: SwitchScope,
    ) -> Result<Option<AstNodeId>> {
        let region = self.region;
        let node = region.node(v);
        let name = node.name().to_owned();
        let dispatcher = match node.kind() {
            BlockKind::EntryDispatcher => DispatcherKind::Entry,
            BlockKind::ExitDispatcher => DispatcherKind::Exit,
            _ => DispatcherKind::NotDispatcher,
        };
        let cond = if dispatcher == DispatcherKind::NotDispatcher {
            let block = node.block().ok_or_else(|| {
                StructureError::unexpected(name.as_str(), "switch vertex without a code block")
            })?;
            Some(self.actx.switch_value(block).ok_or_else(|| {
                StructureError::unexpected(name.as_str(), "switch block without a scrutinee value")
            })?)
        } else {
            None
        };
        let p = self.dom.ipdom(v).ok_or_else(|| {
            StructureError::invariant(name.as_str(), "switch without a postdominator")
        })?;

        // the switch node exists before its cases so switch breaks inside
        // them can refer to it
        let id = self.tree.add(
            name.clone(),
            node.block().cloned(),
            AstKind::Switch {
                cond,
                cases: Vec::new(),
                needs_state_var: false,
                needs_loop_break_dispatcher: false,
                weaved: node.is_weaved(),
                dispatcher,
            },
        );

        let mut case_edges: Vec<(LabelSet, NodeIndex)> = Vec::with_capacity(edges.len());
        for (w, t) in edges {
            match w {
                CfgEdge::Case(ls) => case_edges.push((ls, t)),
                _ => {
                    return Err(StructureError::unexpected(
                        name.clone(),
                        "switch vertex with a non-case edge",
                    ))
                }
            }
        }
        // order cases by smallest label, the default last
        case_edges.sort_by_key(|(ls, _)| {
            (ls.is_empty(), ls.iter().next().copied().unwrap_or(0))
        });

        let mut default_seen = false;
        let mut cases = Vec::with_capacity(case_edges.len());
        for (labels, t) in case_edges {
            if labels.is_empty() {
                if default_seen {
                    return Err(StructureError::invariant(
                        name.clone(),
                        "switch with more than one default case",
                    ));
                }
                default_seen = true;
            }
            let body = match self.build_between(t, Some(p), Some((p, id)))? {
                Some(b) => b,
                // a case that jumps straight out of the region
                None => self.tree.add(
                    "empty case",
                    None,
                    AstKind::Code {
                        implicit_return: false,
                    },
                ),
            };
            cases.push(SwitchCase { labels, body });
        }

        // a break leaving the enclosing loop from inside a case needs a
        // state variable and a dispatcher after the loop
        let breaks_out = cases
            .iter()
            .any(|c| self.tree.contains_loop_break(c.body));
        if breaks_out {
            for c in &cases {
                self.tree.mark_breaks_from_switch(c.body);
            }
        }
        if let AstKind::Switch {
            cases: slot,
            needs_state_var,
            needs_loop_break_dispatcher,
            ..
        } = self.tree.kind_mut(id)
        {
            *slot = cases;
            *needs_state_var = breaks_out;
            *needs_loop_break_dispatcher = breaks_out;
        }

        let s = self.build_between(p, stop, sw)?;
        self.tree.set_successor(id, s);
        Ok(Some(id))
    }

    /// A collapsed loop region becomes an `Scs` whose body is the region's
    /// own AST.
    fn build_loop(
        &mut self,
        v: NodeIndex,
        body_region: &RegionCfg<C::Block>,
        edges: &[(CfgEdge, NodeIndex)],
        stop: Option<NodeIndex>,
        sw: SwitchScope,
    ) -> Result<Option<AstNodeId>> {
        let name = self.region.node(v).name().to_owned();
        if edges.len() > 1 {
            return Err(StructureError::unexpected(
                name.clone(),
                "loop with several successors",
            ));
        }
        let body = build_region(body_region, self.tree, self.ectx, self.actx)?;
        let id = self.tree.add(
            name.clone(),
            None,
            AstKind::Scs {
                body: Some(body),
                loop_kind: LoopKind::WhileTrue,
                related: None,
            },
        );
        if let Some(&(_, succ)) = edges.first() {
            let s = self.build_between(succ, stop, sw)?;
            self.tree.set_successor(id, s);
        }
        Ok(Some(id))
    }
}
