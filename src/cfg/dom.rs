//! Dominator and postdominator services for a region.
//!
//! The inflater and the AST builder consume this narrow interface instead of
//! computing the fixed points themselves, so a test can back a region by a
//! static graph alone.

use super::graph_utils;

use petgraph::algo::dominators;
use petgraph::prelude::*;
use petgraph::visit::Reversed;

use std::collections::HashMap;

pub struct DomInfo {
    idom: HashMap<NodeIndex, NodeIndex>,
    ipdom: HashMap<NodeIndex, NodeIndex>,
    preorder: HashMap<NodeIndex, usize>,
}

impl DomInfo {
    /// Computes both trees for the acyclic region graph rooted at `entry`
    /// with unique exit `exit`.
    pub fn compute<N, E>(
        graph: &StableDiGraph<N, E>,
        entry: NodeIndex,
        exit: NodeIndex,
    ) -> DomInfo {
        let dom = dominators::simple_fast(graph, entry);
        let pdom = dominators::simple_fast(Reversed(graph), exit);

        let mut idom = HashMap::new();
        let mut ipdom = HashMap::new();
        for n in graph.node_indices() {
            if let Some(d) = dom.immediate_dominator(n) {
                idom.insert(n, d);
            }
            if let Some(p) = pdom.immediate_dominator(n) {
                ipdom.insert(n, p);
            }
        }

        DomInfo {
            idom,
            ipdom,
            preorder: graph_utils::preorder_numbering(graph, entry),
        }
    }

    pub fn idom(&self, n: NodeIndex) -> Option<NodeIndex> {
        self.idom.get(&n).copied()
    }

    pub fn ipdom(&self, n: NodeIndex) -> Option<NodeIndex> {
        self.ipdom.get(&n).copied()
    }

    /// DFS preorder number from the region entry. Unreachable vertices have
    /// none.
    pub fn preorder(&self, n: NodeIndex) -> Option<usize> {
        self.preorder.get(&n).copied()
    }

    /// Vertices reachable from the entry, in preorder.
    pub fn preorder_walk(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<_> = self.preorder.keys().copied().collect();
        nodes.sort_by_key(|n| self.preorder[n]);
        nodes
    }

    pub fn dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(d) => cur = d,
                None => return false,
            }
        }
    }

    /// The dominator subtree of `d` that `n` belongs to, identified by the
    /// dominator-tree child of `d` that is an ancestor of (or is) `n`.
    /// Returns `d` itself when `n == d`.
    pub fn subtree_under(&self, d: NodeIndex, n: NodeIndex) -> Option<NodeIndex> {
        if n == d {
            return Some(d);
        }
        let mut cur = n;
        loop {
            let parent = self.idom(cur)?;
            if parent == d {
                return Some(cur);
            }
            cur = parent;
        }
    }
}
