//! Parse and write GraphViz dot files for region graphs.
//!
//! This is a debug and test interface: the emitted files are meant for
//! human inspection and the parser only understands the plain
//! `a -> b;` subset the test fixtures use.

use super::{BlockKind, CfgEdge, CfgSource, LabelSet, RegionCfg};
use crate::error::{Result, StructureError};

use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use regex::Regex;

use std::collections::HashMap;
use std::fmt::Write;

/// A CFG parsed from a dot file; every vertex is a code block named after
/// its dot node.
pub struct DotCfg {
    names: Vec<String>,
    succs: Vec<Vec<usize>>,
    entry: usize,
}

/// Parses a digraph, taking the node named `root` as the entry.
pub fn parse_dot(text: &str, root: &str) -> Result<DotCfg> {
    let edge_re = Regex::new(r#"^\s*"?([\w.]+)"?\s*->\s*"?([\w.]+)"?"#).unwrap();
    let node_re = Regex::new(r#"^\s*"?([\w.]+)"?\s*(\[[^\]]*\])?\s*;?\s*$"#).unwrap();

    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut succs: Vec<Vec<usize>> = Vec::new();

    fn intern(
        name: &str,
        names: &mut Vec<String>,
        index: &mut HashMap<String, usize>,
        succs: &mut Vec<Vec<usize>>,
    ) -> usize {
        if let Some(&i) = index.get(name) {
            return i;
        }
        let i = names.len();
        names.push(name.to_owned());
        index.insert(name.to_owned(), i);
        succs.push(Vec::new());
        i
    }

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty()
            || line == "{"
            || line == "}"
            || line.starts_with("digraph")
            || line.starts_with("graph")
            || line.starts_with("node")
            || line.starts_with("edge")
            || line.starts_with("//")
            || line.starts_with('#')
        {
            continue;
        }
        if let Some(c) = edge_re.captures(line) {
            let a = intern(&c[1], &mut names, &mut index, &mut succs);
            let b = intern(&c[2], &mut names, &mut index, &mut succs);
            succs[a].push(b);
        } else if let Some(c) = node_re.captures(line) {
            intern(&c[1], &mut names, &mut index, &mut succs);
        }
    }

    let entry = *index.get(root).ok_or_else(|| {
        StructureError::malformed(format!("dot graph has no `{}` vertex", root))
    })?;
    Ok(DotCfg {
        names,
        succs,
        entry,
    })
}

impl CfgSource for DotCfg {
    type Block = String;

    fn vertex_count(&self) -> usize {
        self.names.len()
    }

    fn entry(&self) -> usize {
        self.entry
    }

    fn block(&self, v: usize) -> Option<String> {
        Some(self.names[v].clone())
    }

    fn name(&self, v: usize) -> String {
        self.names[v].clone()
    }

    fn successors(&self, v: usize) -> Vec<usize> {
        self.succs[v].clone()
    }

    fn case_labels(&self, v: usize) -> Option<Vec<LabelSet>> {
        // fixture graphs express switches as label sets on >2-way vertices
        if self.succs[v].len() > 2 {
            Some(
                (0..self.succs[v].len() as u64)
                    .map(|i| {
                        let mut ls = LabelSet::new();
                        ls.insert(i);
                        ls
                    })
                    .collect(),
            )
        } else {
            None
        }
    }
}

impl<B> RegionCfg<B> {
    /// Writes the region as a GraphViz digraph, nested loop bodies included.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph region {\n");
        self.write_dot(&mut out, "");
        out.push_str("}\n");
        out
    }

    fn write_dot(&self, out: &mut String, prefix: &str) {
        for n in self.graph().node_indices() {
            let node = self.node(n);
            let weaved = if node.is_weaved() { " weaved" } else { "" };
            writeln!(
                out,
                "  {}n{} [label=\"{} [{:?}{}]\"];",
                prefix,
                n.index(),
                node.name(),
                node.kind(),
                weaved
            )
            .unwrap();
            if let BlockKind::Collapsed(body) = node.kind() {
                let inner = format!("{}n{}_", prefix, n.index());
                body.write_dot(out, &inner);
                writeln!(
                    out,
                    "  {}n{} -> {}n{} [style=dashed label=body];",
                    prefix,
                    n.index(),
                    inner,
                    body.entry().index()
                )
                .unwrap();
            }
        }
        for e in self.graph().edge_references() {
            let label = match e.weight() {
                CfgEdge::Uncond => String::new(),
                CfgEdge::True => " [label=T]".to_owned(),
                CfgEdge::False => " [label=F]".to_owned(),
                CfgEdge::Case(ls) if ls.is_empty() => " [label=default]".to_owned(),
                CfgEdge::Case(ls) => format!(" [label=\"{:?}\"]", ls),
            };
            writeln!(
                out,
                "  {}n{} -> {}n{}{};",
                prefix,
                e.source().index(),
                prefix,
                e.target().index(),
                label
            )
            .unwrap();
        }
    }
}
