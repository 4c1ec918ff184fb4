//! Vertices and edges of a region graph.

use super::RegionCfg;

use std::collections::BTreeSet;
use std::fmt;

/// Labels activating one case of a switch or dispatcher; the `default` case
/// carries an empty set.
pub type LabelSet = BTreeSet<u64>;

/// What a region vertex is.
pub enum BlockKind<B> {
    /// carries a handle to an original code block
    Code(B),
    /// a no-op placeholder
    Empty,
    /// leaving the enclosing loop
    Break,
    /// jumping back to the header of the enclosing loop
    Continue,
    /// switch over the entry state variable; the unique header of a loop
    /// that originally had several entries
    EntryDispatcher,
    /// switch over the exit state variable; the unique successor of a loop
    /// that originally had several exits
    ExitDispatcher,
    /// writes `value` to the entry state variable
    EntrySet { value: u64 },
    /// writes `value` to the exit state variable
    ExitSet { value: u64 },
    /// owns a fully combed loop body region
    Collapsed(Box<RegionCfg<B>>),
    /// structural filler; the synthesized virtual exit of a region
    Tile,
}

/// One vertex of a [`RegionCfg`].
pub struct BlockNode<B> {
    pub(crate) kind: BlockKind<B>,
    pub(crate) name: String,
    pub(crate) weaved: bool,
}

/// Edge weights; successor order of a branching vertex is encoded here.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CfgEdge {
    Uncond,
    True,
    False,
    /// one switch case; an empty label set is the `default`
    Case(LabelSet),
}

impl<B> BlockNode<B> {
    pub fn new(kind: BlockKind<B>, name: impl Into<String>) -> Self {
        BlockNode {
            kind,
            name: name.into(),
            weaved: false,
        }
    }

    pub fn code(block: B, name: impl Into<String>) -> Self {
        Self::new(BlockKind::Code(block), name)
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(BlockKind::Empty, name)
    }

    pub fn kind(&self) -> &BlockKind<B> {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_weaved(&self) -> bool {
        self.weaved
    }

    pub fn set_weaved(&mut self) {
        self.weaved = true;
    }

    /// The original code block, for `Code` vertices.
    pub fn block(&self) -> Option<&B> {
        match &self.kind {
            BlockKind::Code(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_dispatcher(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::EntryDispatcher | BlockKind::ExitDispatcher
        )
    }

    /// The state label written by a `Set` vertex.
    pub fn state_value(&self) -> Option<u64> {
        match self.kind {
            BlockKind::EntrySet { value } | BlockKind::ExitSet { value } => Some(value),
            _ => None,
        }
    }

    pub fn collapsed_region(&self) -> Option<&RegionCfg<B>> {
        match &self.kind {
            BlockKind::Collapsed(r) => Some(r),
            _ => None,
        }
    }
}

impl<B: Clone> Clone for BlockKind<B> {
    fn clone(&self) -> Self {
        use self::BlockKind::*;
        match self {
            Code(b) => Code(b.clone()),
            Empty => Empty,
            Break => Break,
            Continue => Continue,
            EntryDispatcher => EntryDispatcher,
            ExitDispatcher => ExitDispatcher,
            EntrySet { value } => EntrySet { value: *value },
            ExitSet { value } => ExitSet { value: *value },
            Collapsed(r) => Collapsed(r.clone()),
            Tile => Tile,
        }
    }
}

impl<B: Clone> Clone for BlockNode<B> {
    fn clone(&self) -> Self {
        BlockNode {
            kind: self.kind.clone(),
            name: self.name.clone(),
            weaved: self.weaved,
        }
    }
}

impl<B> fmt::Debug for BlockKind<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::BlockKind::*;
        match self {
            Code(_) => f.write_str("Code"),
            Empty => f.write_str("Empty"),
            Break => f.write_str("Break"),
            Continue => f.write_str("Continue"),
            EntryDispatcher => f.write_str("EntryDispatcher"),
            ExitDispatcher => f.write_str("ExitDispatcher"),
            EntrySet { value } => write!(f, "EntrySet({})", value),
            ExitSet { value } => write!(f, "ExitSet({})", value),
            Collapsed(_) => f.write_str("Collapsed"),
            Tile => f.write_str("Tile"),
        }
    }
}

impl<B> fmt::Debug for BlockNode<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {:?}", self.kind, self.name)?;
        if self.weaved {
            f.write_str(" weaved")?;
        }
        Ok(())
    }
}
