//! The inflation (combing) fixed point.
//!
//! Repeatedly finds vertices that merge paths from different dominator
//! subtrees before the postdominator of the branch they came from, and
//! clones the merged vertex together with its dominated subgraph so that
//! each predecessor partition reaches its own copy.

use super::dom::DomInfo;
use super::graph_utils;
use super::node::{BlockKind, CfgEdge};
use super::RegionCfg;
use crate::error::{Result, StructureError};

use log::{debug, trace};
use petgraph::prelude::*;
use petgraph::visit::EdgeRef;

use std::collections::HashMap;

/// Predecessor edges of a problematic vertex, grouped by the dominator
/// subtree their source belongs to and ordered by entry preorder of the
/// subtree root. The first partition keeps the original vertex.
type Partitions = Vec<(NodeIndex, Vec<EdgeIndex>)>;

pub(super) fn run<B: Clone>(region: &mut RegionCfg<B>) -> Result<()> {
    let n0 = region.graph().node_count();
    let bound = 2 * n0 * n0;
    let mut cloned = 0usize;

    loop {
        region.ensure_exit()?;
        let exit = region.exit().expect("ensure_exit sets the exit");
        let dom = DomInfo::compute(region.graph(), region.entry(), exit);

        let (v, partitions) = match find_problematic(region, &dom, exit) {
            Some(found) => found,
            None => break,
        };
        debug!(
            "inflating vertex `{}`: {} predecessor partitions",
            region.node(v).name(),
            partitions.len()
        );

        cloned += clone_per_partition(region, v, partitions)?;
        if cloned > bound {
            return Err(StructureError::InflationDiverged {
                vertex: region.node(v).name().to_owned(),
                bound,
            });
        }
    }
    Ok(())
}

/// Finds the first vertex, in dominator-tree preorder, that is reached from
/// more than one dominator subtree of its immediate dominator without being
/// the postdominator those branches legitimately converge on.
fn find_problematic<B>(
    region: &RegionCfg<B>,
    dom: &DomInfo,
    exit: NodeIndex,
) -> Option<(NodeIndex, Partitions)> {
    for v in dom.preorder_walk() {
        if v == region.entry() || v == exit {
            continue;
        }
        let preds: Vec<(EdgeIndex, NodeIndex)> = region
            .graph()
            .edges_directed(v, Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        let d = match dom.idom(v) {
            Some(d) => d,
            None => continue,
        };
        debug_assert!(dom.dominates(d, v));
        if dom.ipdom(d) == Some(v) {
            // the legitimate merge point of `d`'s branches
            continue;
        }

        let mut partitions: Partitions = Vec::new();
        for (e, p) in preds {
            let class = match dom.subtree_under(d, p) {
                Some(c) => c,
                None => continue,
            };
            match partitions.iter_mut().find(|(c, _)| *c == class) {
                Some((_, edges)) => edges.push(e),
                None => partitions.push((class, vec![e])),
            }
        }
        if partitions.len() >= 2 {
            partitions.sort_by_key(|&(c, _)| dom.preorder(c).unwrap_or(usize::MAX));
            return Some((v, partitions));
        }
    }
    None
}

/// Clones `v` and the subgraph it dominates once per predecessor partition
/// beyond the first; each partition's edges are retargeted to its own copy.
/// Returns the number of vertices created.
fn clone_per_partition<B: Clone>(
    region: &mut RegionCfg<B>,
    v: NodeIndex,
    partitions: Partitions,
) -> Result<usize> {
    let mut dominated = graph_utils::dominated_by(region.graph(), region.entry(), v);
    if let Some(exit) = region.exit() {
        // never duplicate the virtual exit
        if matches!(region.node(exit).kind(), BlockKind::Tile) {
            dominated.remove(exit);
        }
    }
    debug_assert!(dominated.contains(v));

    let mut cloned = 0;
    for (_, edges) in partitions.into_iter().skip(1) {
        let mut map = HashMap::new();
        for n in &dominated {
            let mut w = region.graph[n].clone();
            w.name = format!("{} (cloned)", w.name);
            let c = region.graph.add_node(w);
            trace!("cloned vertex `{}` as {:?}", region.graph[c].name(), c);
            map.insert(n, c);
        }
        cloned += map.len();

        let edge_list: Vec<(NodeIndex, NodeIndex, CfgEdge)> = dominated
            .iter()
            .flat_map(|n| {
                region
                    .graph
                    .edges(n)
                    .map(|e| (n, e.target(), e.weight().clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (src, tgt, w) in edge_list {
            let nt = map.get(&tgt).copied().unwrap_or(tgt);
            region.graph.add_edge(map[&src], nt, w);
        }

        // this partition's predecessors now reach their own copy
        for e in edges {
            graph_utils::retarget_edge(&mut region.graph, e, map[&v]);
        }

        // a duplicated switch has its cases emitted once per copy; flag both
        // so later passes do not emit the underlying code twice
        for (&old, &new) in &map {
            let has_cases = region
                .graph
                .edges(old)
                .any(|e| matches!(e.weight(), CfgEdge::Case(_)));
            if has_cases {
                region.graph[old].set_weaved();
                region.graph[new].set_weaved();
            }
        }
    }
    Ok(cloned)
}
