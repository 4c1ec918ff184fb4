//! Generic graph algorithms over [`StableDiGraph`]s.
//!
//! Anything that doesn't need to know anything about the node/edge weights of
//! the region graph goes here.

pub mod node_set;
#[cfg(test)]
mod test;

pub use self::node_set::{EdgeSet, NodeSet};

use petgraph::prelude::*;
use petgraph::visit::{EdgeRef, VisitMap};

use std::collections::HashMap;

pub enum DfsEvent {
    Discover(NodeIndex),
    TreeEdge(EdgeIndex),
    BackEdge(EdgeIndex),
    CrossForwardEdge(EdgeIndex),
    Finish(NodeIndex),
}

struct DfsState<'a, N, E, F: FnMut(DfsEvent)> {
    graph: &'a StableDiGraph<N, E>,
    discovered: NodeSet,
    finished: NodeSet,
    visitor: F,
}

impl<'a, N, E, F: FnMut(DfsEvent)> DfsState<'a, N, E, F> {
    fn go_rec(&mut self, u: NodeIndex) {
        if self.discovered.insert(u) {
            (self.visitor)(DfsEvent::Discover(u));
            let edges: Vec<_> = self
                .graph
                .edges(u)
                .map(|e| (e.id(), e.target()))
                .collect();
            for (e, v) in edges {
                if !self.discovered.contains(v) {
                    (self.visitor)(DfsEvent::TreeEdge(e));
                    self.go_rec(v);
                } else if !self.finished.contains(v) {
                    (self.visitor)(DfsEvent::BackEdge(e));
                } else {
                    (self.visitor)(DfsEvent::CrossForwardEdge(e));
                }
            }
            let _first_finish = self.finished.insert(u);
            debug_assert!(_first_finish);
            (self.visitor)(DfsEvent::Finish(u));
        }
    }
}

/// Like [`petgraph::visit::depth_first_search`], but with edge events.
pub fn depth_first_search<N, E, F>(graph: &StableDiGraph<N, E>, start: NodeIndex, visitor: F)
where
    F: FnMut(DfsEvent),
{
    DfsState {
        graph,
        discovered: NodeSet::new(),
        finished: NodeSet::new(),
        visitor,
    }
    .go_rec(start);
}

/// Returns the edges whose targets were already on the visit stack during a
/// depth-first search from `start`, i.e. the retreating edges of the graph.
pub fn back_edges<N, E>(graph: &StableDiGraph<N, E>, start: NodeIndex) -> EdgeSet {
    let mut ret = EdgeSet::new();
    depth_first_search(graph, start, |ev| {
        if let DfsEvent::BackEdge(e) = ev {
            ret.insert(e);
        }
    });
    ret
}

/// DFS preorder numbering of all nodes reachable from `start`.
pub fn preorder_numbering<N, E>(
    graph: &StableDiGraph<N, E>,
    start: NodeIndex,
) -> HashMap<NodeIndex, usize> {
    let mut ret = HashMap::new();
    depth_first_search(graph, start, |ev| {
        if let DfsEvent::Discover(n) = ev {
            let num = ret.len();
            ret.insert(n, num);
        }
    });
    ret
}

/// Moves the target of `edge` to `new_target`, keeping its weight.
pub fn retarget_edge<N, E>(
    graph: &mut StableDiGraph<N, E>,
    edge: EdgeIndex,
    new_target: NodeIndex,
) -> EdgeIndex {
    let source = graph.edge_endpoints(edge).expect("no edge").0;
    let w = graph.remove_edge(edge).expect("no edge");
    graph.add_edge(source, new_target, w)
}

/// Returns the union of the successors of each node in `set` differenced
/// with `set`.
pub fn strict_successors_of_set<N, E>(graph: &StableDiGraph<N, E>, set: &NodeSet) -> NodeSet {
    set.iter()
        .flat_map(|n| graph.neighbors(n))
        .filter(|&n| !set.contains(n))
        .collect()
}

/// Returns the set of nodes that `h` dominates, including `h` itself.
/// Nodes unreachable from `entry` are never reported.
pub fn dominated_by<N, E>(graph: &StableDiGraph<N, E>, entry: NodeIndex, h: NodeIndex) -> NodeSet {
    let mut reachable = NodeSet::new();
    let mut dfs = Dfs::new(graph, entry);
    while let Some(n) = dfs.next(graph) {
        reachable.insert(n);
    }

    if entry == h {
        return reachable;
    }

    // every node reachable from the entry while `h` is blocked off is not
    // dominated by `h`
    let mut dfs = Dfs::new(graph, entry);
    dfs.discovered.visit(h);
    let mut inv_dom_set = NodeSet::new();
    while let Some(n) = dfs.next(graph) {
        inv_dom_set.insert(n);
    }
    reachable.difference_with(&inv_dom_set);
    reachable
}

/// Detaches the nodes in `nodes` (and every edge among them) into a fresh
/// graph. Returns the subgraph, the old-to-new index map, and the external
/// edges that were severed: `(pred, weight)` pairs for edges into the set and
/// `(succ, weight)` pairs for edges out of it.
pub fn extract_subgraph<N, E>(
    graph: &mut StableDiGraph<N, E>,
    nodes: &NodeSet,
) -> (
    StableDiGraph<N, E>,
    HashMap<NodeIndex, NodeIndex>,
    Vec<(NodeIndex, E)>,
    Vec<(NodeIndex, E)>,
) {
    debug_assert!(!nodes.is_empty());

    let mut preds = Vec::new();
    let mut succs = Vec::new();
    let mut internal_edges = Vec::new();

    // remove and store every edge incident to every node in the set
    for n in nodes {
        let mut outgoing = graph.neighbors_directed(n, Outgoing).detach();
        while let Some((edge, succ)) = outgoing.next(graph) {
            let weight = graph.remove_edge(edge).unwrap();
            if nodes.contains(succ) {
                internal_edges.push((n, succ, weight));
            } else {
                succs.push((succ, weight));
            }
        }
        let mut incoming = graph.neighbors_directed(n, Incoming).detach();
        while let Some((edge, pred)) = incoming.next(graph) {
            let weight = graph.remove_edge(edge).unwrap();
            if nodes.contains(pred) {
                internal_edges.push((pred, n, weight));
            } else {
                preds.push((pred, weight));
            }
        }
    }

    let mut old_new_map = HashMap::with_capacity(nodes.len());
    let mut subgraph = StableDiGraph::with_capacity(nodes.len(), internal_edges.len());

    for old_node in nodes {
        debug_assert!(graph.neighbors_undirected(old_node).next().is_none());
        let weight = graph.remove_node(old_node).unwrap();
        let new_node = subgraph.add_node(weight);
        old_new_map.insert(old_node, new_node);
    }

    for (src, dst, weight) in internal_edges {
        subgraph.add_edge(old_new_map[&src], old_new_map[&dst], weight);
    }

    (subgraph, old_new_map, preds, succs)
}

/// Returns if `node` has no incoming edges.
pub fn is_source<N, E>(graph: &StableDiGraph<N, E>, node: NodeIndex) -> bool {
    graph.neighbors_directed(node, Incoming).next().is_none()
}

/// Returns if `node` has no outgoing edges.
pub fn is_sink<N, E>(graph: &StableDiGraph<N, E>, node: NodeIndex) -> bool {
    graph.neighbors_directed(node, Outgoing).next().is_none()
}

/// The edges going from a node in `src_region` to `tgt_node`.
pub fn edges_from_region_to_node<N, E>(
    graph: &StableDiGraph<N, E>,
    src_region: &NodeSet,
    tgt_node: NodeIndex,
) -> Vec<EdgeIndex> {
    graph
        .edges_directed(tgt_node, Incoming)
        .filter(|e| src_region.contains(e.source()))
        .map(|e| e.id())
        .collect()
}
