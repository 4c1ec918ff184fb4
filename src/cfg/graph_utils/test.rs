use super::*;
use petgraph::algo;

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

/// Builds a graph from a random edge list over at most 16 nodes.
fn mk_graph(edges: &[(u8, u8)]) -> StableDiGraph<(), ()> {
    let mut graph = StableDiGraph::new();
    let nodes: Vec<_> = (0..16).map(|_| graph.add_node(())).collect();
    for &(a, b) in edges {
        graph.add_edge(nodes[(a % 16) as usize], nodes[(b % 16) as usize], ());
    }
    graph
}

/// Tests `dominated_by` against the petgraph dominator fixed point.
#[quickcheck]
fn qc_dominated_by(edges: Vec<(u8, u8)>, root_i: u8, h_i: u8) -> TestResult {
    let graph = mk_graph(&edges);
    let nodes: Vec<_> = graph.node_indices().collect();
    let root = nodes[(root_i % 16) as usize];
    let h = nodes[(h_i % 16) as usize];

    let dominators = algo::dominators::simple_fast(&graph, root);
    let true_dom_set: NodeSet = graph
        .node_indices()
        .filter(|&n| {
            dominators
                .dominators(n)
                .map_or(false, |mut doms| doms.any(|d| d == h))
        })
        .collect();

    let dom_set = dominated_by(&graph, root, h);

    TestResult::from_bool(dom_set == true_dom_set)
}

/// Tests that removing the reported back edges makes the reachable part of
/// the graph acyclic.
#[quickcheck]
fn qc_back_edge_removal_breaks_cycles(edges: Vec<(u8, u8)>, root_i: u8) -> bool {
    let mut graph = mk_graph(&edges);
    let nodes: Vec<_> = graph.node_indices().collect();
    let root = nodes[(root_i % 16) as usize];

    let backs = back_edges(&graph, root);
    graph.retain_edges(|_, e| !backs.contains(e));

    let mut reach = NodeSet::new();
    let mut dfs = Dfs::new(&graph, root);
    while let Some(n) = dfs.next(&graph) {
        reach.insert(n);
    }
    graph.retain_nodes(|_, n| reach.contains(n));

    !algo::is_cyclic_directed(&graph)
}

/// Tests that `extract_subgraph` conserves nodes and internal edges.
#[quickcheck]
fn qc_extract_subgraph_conserves(edges: Vec<(u8, u8)>, picks: Vec<u8>) -> TestResult {
    if picks.is_empty() {
        return TestResult::discard();
    }
    let mut graph = mk_graph(&edges);
    let nodes: Vec<_> = graph.node_indices().collect();
    let set: NodeSet = picks.iter().map(|&p| nodes[(p % 16) as usize]).collect();

    let total_nodes = graph.node_count();
    let total_edges = graph.edge_count();
    let internal = graph
        .edge_indices()
        .filter(|&e| {
            let (s, t) = graph.edge_endpoints(e).unwrap();
            set.contains(s) && set.contains(t)
        })
        .count();

    let (sub, map, preds, succs) = extract_subgraph(&mut graph, &set);

    if sub.node_count() != set.len() || map.len() != set.len() {
        return TestResult::failed();
    }
    if graph.node_count() + sub.node_count() != total_nodes {
        return TestResult::failed();
    }
    if sub.edge_count() != internal {
        return TestResult::failed();
    }
    // severed external edges are all accounted for
    TestResult::from_bool(graph.edge_count() + internal + preds.len() + succs.len() == total_edges)
}

#[test]
fn preorder_starts_at_entry() {
    let mut graph = StableDiGraph::<(), ()>::new();
    let a = graph.add_node(());
    let b = graph.add_node(());
    let c = graph.add_node(());
    graph.add_edge(a, b, ());
    graph.add_edge(b, c, ());
    graph.add_edge(a, c, ());

    let pre = preorder_numbering(&graph, a);
    assert_eq!(pre[&a], 0);
    assert!(pre[&b] > 0 && pre[&c] > 0);
    assert_eq!(pre.len(), 3);
}

#[test]
fn retarget_keeps_source_and_weight() {
    let mut graph = StableDiGraph::<(), u32>::new();
    let a = graph.add_node(());
    let b = graph.add_node(());
    let c = graph.add_node(());
    let e = graph.add_edge(a, b, 7);

    let e2 = retarget_edge(&mut graph, e, c);
    assert_eq!(graph.edge_endpoints(e2), Some((a, c)));
    assert_eq!(graph[e2], 7);
    assert!(graph.find_edge(a, b).is_none());
}
