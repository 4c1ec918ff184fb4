//! The mutable region graph and its combing transformation.
//!
//! A [`RegionCfg`] owns the vertices and edges of one single-entry region.
//! Combing removes irreducibility by node cloning, funnels multi-entry and
//! multi-exit loops through synthesized state-variable dispatchers, and
//! collapses every loop body into a [`BlockKind::Collapsed`] vertex, leaving
//! an acyclic region hierarchy the AST builder can lift.

pub mod dom;
pub mod dot;
pub mod graph_utils;
pub mod node;

mod inflate;
#[cfg(test)]
mod test;

pub use self::node::{BlockKind, BlockNode, CfgEdge, LabelSet};

use self::graph_utils::NodeSet;
use crate::error::{Result, StructureError};

use log::debug;
use petgraph::algo::tarjan_scc;
use petgraph::prelude::*;
use petgraph::visit::EdgeRef;

use std::collections::HashMap;
use std::fmt;
use std::mem;

/// The input contract: any CFG that can enumerate its vertices and their
/// ordered successors can be restructured. Vertices are identified by dense
/// indices `0..vertex_count()`.
pub trait CfgSource {
    type Block: Clone;

    fn vertex_count(&self) -> usize;

    fn entry(&self) -> usize;

    /// The original code block of vertex `v`; `None` for a vertex that only
    /// exists to route control flow.
    fn block(&self, v: usize) -> Option<Self::Block>;

    fn name(&self, v: usize) -> String;

    /// Ordered successors; for a two-way branch the first is the true edge.
    fn successors(&self, v: usize) -> Vec<usize>;

    /// Case labels of a switch vertex, one set per successor in order; an
    /// empty set is the default case. `None` for non-switch vertices.
    fn case_labels(&self, v: usize) -> Option<Vec<LabelSet>> {
        let _ = v;
        None
    }
}

/// A single-entry region subject to structuring. See the module docs.
#[derive(Clone)]
pub struct RegionCfg<B> {
    graph: StableDiGraph<BlockNode<B>, CfgEdge>,
    entry: NodeIndex,
    exit: Option<NodeIndex>,
}

impl<B: Clone> RegionCfg<B> {
    /// Builds a region graph from an external CFG.
    pub fn from_source<S: CfgSource<Block = B>>(source: &S) -> Result<RegionCfg<B>> {
        let n = source.vertex_count();
        if n == 0 {
            return Err(StructureError::malformed("CFG has no vertices"));
        }
        if source.entry() >= n {
            return Err(StructureError::malformed(format!(
                "entry index {} out of range",
                source.entry()
            )));
        }

        let mut graph = StableDiGraph::new();
        let idx: Vec<NodeIndex> = (0..n)
            .map(|v| {
                let name = source.name(v);
                let node = match source.block(v) {
                    Some(b) => BlockNode::code(b, name),
                    None => BlockNode::empty(name),
                };
                graph.add_node(node)
            })
            .collect();

        for v in 0..n {
            let succs = source.successors(v);
            for &s in &succs {
                if s >= n {
                    return Err(StructureError::malformed(format!(
                        "dangling edge {} -> {}",
                        source.name(v),
                        s
                    )));
                }
            }
            match (succs.len(), source.case_labels(v)) {
                (0, _) => {}
                (k, Some(labels)) => {
                    if labels.len() != k {
                        return Err(StructureError::malformed(format!(
                            "vertex {} has {} successors but {} label sets",
                            source.name(v),
                            k,
                            labels.len()
                        )));
                    }
                    for (&s, ls) in succs.iter().zip(labels) {
                        graph.add_edge(idx[v], idx[s], CfgEdge::Case(ls));
                    }
                }
                (1, None) => {
                    graph.add_edge(idx[v], idx[succs[0]], CfgEdge::Uncond);
                }
                (2, None) => {
                    graph.add_edge(idx[v], idx[succs[0]], CfgEdge::True);
                    graph.add_edge(idx[v], idx[succs[1]], CfgEdge::False);
                }
                (_, None) => {
                    return Err(StructureError::malformed(format!(
                        "vertex {} has several successors but no case labels",
                        source.name(v)
                    )));
                }
            }
        }

        let entry = idx[source.entry()];

        // vertices the entry cannot reach can never be structured
        let mut reachable = NodeSet::new();
        let mut dfs = Dfs::new(&graph, entry);
        while let Some(v) = dfs.next(&graph) {
            reachable.insert(v);
        }
        if reachable.len() < graph.node_count() {
            debug!(
                "dropping {} vertices unreachable from the entry",
                graph.node_count() - reachable.len()
            );
            graph.retain_nodes(|_, v| reachable.contains(v));
        }

        Ok(RegionCfg {
            graph,
            entry,
            exit: None,
        })
    }
}

impl<B> RegionCfg<B> {
    pub fn entry(&self) -> NodeIndex {
        self.entry
    }

    pub fn exit(&self) -> Option<NodeIndex> {
        self.exit
    }

    pub fn graph(&self) -> &StableDiGraph<BlockNode<B>, CfgEdge> {
        &self.graph
    }

    pub fn node(&self, n: NodeIndex) -> &BlockNode<B> {
        &self.graph[n]
    }

    /// Outgoing edges of `n` with their weights.
    pub(crate) fn out_edges(&self, n: NodeIndex) -> Vec<(CfgEdge, NodeIndex)> {
        self.graph
            .edges(n)
            .map(|e| (e.weight().clone(), e.target()))
            .collect()
    }

    /// Checks whether two regions have the same shape: a bijection between
    /// the vertices that maps entry to entry and preserves vertex kinds and
    /// edge weights. Vertex identities and names are ignored.
    ///
    /// Backtracks over successor pairings, so this is only meant for
    /// test-sized graphs.
    pub fn is_topologically_equivalent(&self, other: &RegionCfg<B>) -> bool {
        if self.graph.node_count() != other.graph.node_count()
            || self.graph.edge_count() != other.graph.edge_count()
        {
            return false;
        }
        let mut fwd = HashMap::new();
        let mut bwd = HashMap::new();
        self.try_match(other, self.entry, other.entry, &mut fwd, &mut bwd)
    }

    fn try_match(
        &self,
        other: &RegionCfg<B>,
        a: NodeIndex,
        b: NodeIndex,
        fwd: &mut HashMap<NodeIndex, NodeIndex>,
        bwd: &mut HashMap<NodeIndex, NodeIndex>,
    ) -> bool {
        match (fwd.get(&a), bwd.get(&b)) {
            (Some(&mb), _) => return mb == b,
            (None, Some(_)) => return false,
            (None, None) => {}
        }
        if !self.compatible(other, a, b) {
            return false;
        }

        fwd.insert(a, b);
        bwd.insert(b, a);
        let ea = self.out_edges(a);
        let eb = other.out_edges(b);
        if ea.len() == eb.len() && self.assign(other, &ea, &eb, &mut vec![false; eb.len()], 0, fwd, bwd)
        {
            true
        } else {
            fwd.remove(&a);
            bwd.remove(&b);
            false
        }
    }

    fn assign(
        &self,
        other: &RegionCfg<B>,
        ea: &[(CfgEdge, NodeIndex)],
        eb: &[(CfgEdge, NodeIndex)],
        used: &mut Vec<bool>,
        i: usize,
        fwd: &mut HashMap<NodeIndex, NodeIndex>,
        bwd: &mut HashMap<NodeIndex, NodeIndex>,
    ) -> bool {
        if i == ea.len() {
            return true;
        }
        for j in 0..eb.len() {
            if used[j] || ea[i].0 != eb[j].0 {
                continue;
            }
            let snap_f = fwd.clone();
            let snap_b = bwd.clone();
            if self.try_match(other, ea[i].1, eb[j].1, fwd, bwd) {
                used[j] = true;
                if self.assign(other, ea, eb, used, i + 1, fwd, bwd) {
                    return true;
                }
                used[j] = false;
            }
            *fwd = snap_f;
            *bwd = snap_b;
        }
        false
    }

    fn compatible(&self, other: &RegionCfg<B>, a: NodeIndex, b: NodeIndex) -> bool {
        let na = &self.graph[a];
        let nb = &other.graph[b];
        if mem::discriminant(&na.kind) != mem::discriminant(&nb.kind) {
            return false;
        }
        if na.state_value() != nb.state_value() || na.is_weaved() != nb.is_weaved() {
            return false;
        }
        match (&na.kind, &nb.kind) {
            (BlockKind::Collapsed(ra), BlockKind::Collapsed(rb)) => {
                ra.is_topologically_equivalent(rb)
            }
            _ => true,
        }
    }
}

impl<B: Clone> RegionCfg<B> {
    /// Combs the region: collapses every cycle into a nested loop body
    /// region (inside out), then inflates the remaining acyclic graph until
    /// it is structurable.
    pub fn comb(&mut self) -> Result<()> {
        debug!(
            "combing region of {} vertices, entry {:?}",
            self.graph.node_count(),
            self.graph[self.entry].name()
        );
        self.collapse_cycles()?;
        self.ensure_exit()?;
        inflate::run(self)?;
        self.check();
        Ok(())
    }

    fn collapse_cycles(&mut self) -> Result<()> {
        loop {
            let sccs: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
                .into_iter()
                .filter(|scc| {
                    scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
                })
                .collect();
            if sccs.is_empty() {
                return Ok(());
            }
            for scc in sccs {
                self.collapse_one(&scc)?;
            }
        }
    }

    /// Carves the strongly connected set `scc` out of this region and
    /// replaces it with a single `Collapsed` vertex owning the combed body.
    fn collapse_one(&mut self, scc: &[NodeIndex]) -> Result<()> {
        let mut set: NodeSet = scc.iter().copied().collect();
        let pre = graph_utils::preorder_numbering(&self.graph, self.entry);

        // vertices of the cycle that are entered from outside
        let mut entry_targets: Vec<NodeIndex> = Vec::new();
        for n in &set {
            let entered = n == self.entry
                || self
                    .graph
                    .edges_directed(n, Incoming)
                    .any(|e| !set.contains(e.source()));
            if entered {
                entry_targets.push(n);
            }
        }
        entry_targets.sort_by_key(|n| pre.get(n).copied().unwrap_or(usize::MAX));
        if entry_targets.is_empty() || !pre.contains_key(&entry_targets[0]) {
            return Err(StructureError::malformed(
                "cycle not reachable from the region entry",
            ));
        }

        let header = if entry_targets.len() == 1 {
            entry_targets[0]
        } else {
            debug!("loop with {} entries, synthesizing dispatcher", entry_targets.len());
            self.synth_entry_dispatcher(&mut set, &entry_targets)?
        };

        // latch edges become `Continue` sinks inside the body
        for e in graph_utils::edges_from_region_to_node(&self.graph, &set, header) {
            let c = self
                .graph
                .add_node(BlockNode::new(BlockKind::Continue, "continue"));
            graph_utils::retarget_edge(&mut self.graph, e, c);
            set.insert(c);
        }

        // vertices outside the cycle that it exits to
        let mut exit_targets: Vec<NodeIndex> =
            graph_utils::strict_successors_of_set(&self.graph, &set)
                .iter()
                .collect();
        exit_targets.sort_by_key(|n| pre.get(n).copied().unwrap_or(usize::MAX));

        let succ = match exit_targets.len() {
            0 => None,
            1 => Some(exit_targets[0]),
            _ => {
                debug!("loop with {} exits, synthesizing dispatcher", exit_targets.len());
                Some(self.synth_exit_dispatcher(&mut set, &exit_targets)?)
            }
        };

        // every edge out of the loop becomes a `Break` sink inside the body
        if let Some(succ) = succ {
            for e in graph_utils::edges_from_region_to_node(&self.graph, &set, succ) {
                let b = self
                    .graph
                    .add_node(BlockNode::new(BlockKind::Break, "break"));
                graph_utils::retarget_edge(&mut self.graph, e, b);
                set.insert(b);
            }
        }

        let entry_in_cycle = set.contains(self.entry);
        let (subgraph, map, preds, severed_succs) =
            graph_utils::extract_subgraph(&mut self.graph, &set);
        debug_assert!(severed_succs.is_empty());

        let mut body = RegionCfg {
            graph: subgraph,
            entry: map[&header],
            exit: None,
        };
        body.comb()?;

        let name = format!("loop_{}", body.graph[body.entry].name());
        let collapsed = self
            .graph
            .add_node(BlockNode::new(BlockKind::Collapsed(Box::new(body)), name));

        for (p, w) in preds {
            self.graph.add_edge(p, collapsed, w);
        }
        if let Some(succ) = succ {
            self.graph.add_edge(collapsed, succ, CfgEdge::Uncond);
        }
        if entry_in_cycle {
            self.entry = collapsed;
        }
        Ok(())
    }

    /// Routes every entry of a multi-entry loop through an `EntrySet`
    /// vertex feeding a fresh `EntryDispatcher`, which becomes the unique
    /// loop header. State values are densely packed from 0 in preorder of
    /// the original entry targets.
    fn synth_entry_dispatcher(
        &mut self,
        set: &mut NodeSet,
        targets: &[NodeIndex],
    ) -> Result<NodeIndex> {
        let disp = self.graph.add_node(BlockNode::new(
            BlockKind::EntryDispatcher,
            "entry dispatcher",
        ));
        set.insert(disp);

        for (value, &t) in targets.iter().enumerate() {
            let value = value as u64;
            let mut labels = LabelSet::new();
            labels.insert(value);
            self.graph.add_edge(disp, t, CfgEdge::Case(labels));

            let in_edges: Vec<EdgeIndex> = self
                .graph
                .edges_directed(t, Incoming)
                .filter(|e| e.source() != disp)
                .map(|e| e.id())
                .collect();
            for e in in_edges {
                let src = self.graph.edge_endpoints(e).expect("no edge").0;
                let s = self.graph.add_node(BlockNode::new(
                    BlockKind::EntrySet { value },
                    format!("entry set {}", value),
                ));
                graph_utils::retarget_edge(&mut self.graph, e, s);
                self.graph.add_edge(s, disp, CfgEdge::Uncond);
                if set.contains(src) {
                    set.insert(s);
                }
            }

            if t == self.entry {
                // the region entry itself is a loop entry; give it a set
                // vertex so the dispatcher stays the unique header
                let s = self.graph.add_node(BlockNode::new(
                    BlockKind::EntrySet { value },
                    format!("entry set {}", value),
                ));
                self.graph.add_edge(s, disp, CfgEdge::Uncond);
                self.entry = s;
            }
        }
        Ok(disp)
    }

    /// Funnels every exit edge of a multi-exit loop through an `ExitSet`
    /// vertex; the edges then converge on a fresh `ExitDispatcher` outside
    /// the loop, which becomes its unique successor.
    fn synth_exit_dispatcher(
        &mut self,
        set: &mut NodeSet,
        targets: &[NodeIndex],
    ) -> Result<NodeIndex> {
        let disp = self.graph.add_node(BlockNode::new(
            BlockKind::ExitDispatcher,
            "exit dispatcher",
        ));

        for (value, &t) in targets.iter().enumerate() {
            let value = value as u64;
            let mut labels = LabelSet::new();
            labels.insert(value);
            self.graph.add_edge(disp, t, CfgEdge::Case(labels));

            for e in graph_utils::edges_from_region_to_node(&self.graph, set, t) {
                let s = self.graph.add_node(BlockNode::new(
                    BlockKind::ExitSet { value },
                    format!("exit set {}", value),
                ));
                graph_utils::retarget_edge(&mut self.graph, e, s);
                self.graph.add_edge(s, disp, CfgEdge::Uncond);
                set.insert(s);
            }
        }
        Ok(disp)
    }

    /// Makes sure the region has a unique exit vertex, synthesizing a
    /// virtual `Tile` sink when several sinks exist.
    pub(crate) fn ensure_exit(&mut self) -> Result<()> {
        let sinks: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| graph_utils::is_sink(&self.graph, n))
            .collect();
        match sinks.len() {
            0 => Err(StructureError::malformed("region has no exit vertex")),
            1 => {
                self.exit = Some(sinks[0]);
                Ok(())
            }
            _ => {
                let tile = match self.exit {
                    Some(t) if matches!(self.graph[t].kind, BlockKind::Tile) => t,
                    _ => self
                        .graph
                        .add_node(BlockNode::new(BlockKind::Tile, "virtual exit")),
                };
                for s in sinks {
                    if s != tile {
                        self.graph.add_edge(s, tile, CfgEdge::Uncond);
                    }
                }
                self.exit = Some(tile);
                Ok(())
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn check(&self) {}

    #[cfg(debug_assertions)]
    fn check(&self) {
        assert!(self.graph.contains_node(self.entry));
        assert!(graph_utils::is_source(&self.graph, self.entry));
        assert!(
            graph_utils::back_edges(&self.graph, self.entry).is_empty(),
            "combed region still has a cycle"
        );
        for n in self.graph.node_indices() {
            let out_degree = self.graph.neighbors(n).count();
            match self.graph[n].kind {
                BlockKind::EntryDispatcher | BlockKind::ExitDispatcher => {
                    assert!(out_degree >= 2, "dispatcher with fewer than 2 successors");
                    assert!(self
                        .graph
                        .edges(n)
                        .all(|e| matches!(e.weight(), CfgEdge::Case(_))));
                }
                BlockKind::Break | BlockKind::Continue | BlockKind::Tile => {
                    assert!(out_degree <= 1);
                }
                BlockKind::Collapsed(ref r) => {
                    assert!(r.graph.node_count() > 0);
                    assert!(out_degree <= 1, "loop with several successors");
                }
                _ => {}
            }
        }
    }
}

impl<B> fmt::Debug for RegionCfg<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RegionCfg")
            .field("graph", &self.graph)
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .finish()
    }
}
