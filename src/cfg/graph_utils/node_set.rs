//! Bit-set wrappers keyed by petgraph indices.

use bit_set::{self, BitSet};
use petgraph::prelude::{EdgeIndex, NodeIndex};

use std::iter::FromIterator;

macro_rules! index_set {
    ($(#[$attr:meta])* $name:ident, $ix:ty) => {
        $(#[$attr])*
        #[derive(Clone, Default, PartialEq, Eq, Debug)]
        pub struct $name(BitSet);

        impl $name {
            pub fn new() -> Self {
                $name(BitSet::new())
            }

            pub fn insert(&mut self, i: $ix) -> bool {
                self.0.insert(i.index())
            }

            pub fn remove(&mut self, i: $ix) -> bool {
                self.0.remove(i.index())
            }

            pub fn contains(&self, i: $ix) -> bool {
                self.0.contains(i.index())
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn clear(&mut self) {
                self.0.clear()
            }

            pub fn union_with(&mut self, other: &Self) {
                self.0.union_with(&other.0)
            }

            pub fn intersect_with(&mut self, other: &Self) {
                self.0.intersect_with(&other.0)
            }

            pub fn difference_with(&mut self, other: &Self) {
                self.0.difference_with(&other.0)
            }

            pub fn iter(&self) -> impl Iterator<Item = $ix> + '_ {
                self.0.iter().map(<$ix>::new)
            }
        }

        impl FromIterator<$ix> for $name {
            fn from_iter<I: IntoIterator<Item = $ix>>(iter: I) -> Self {
                let mut ret = Self::new();
                ret.extend(iter);
                ret
            }
        }

        impl Extend<$ix> for $name {
            fn extend<I: IntoIterator<Item = $ix>>(&mut self, iter: I) {
                for i in iter {
                    self.insert(i);
                }
            }
        }

        impl<'a> IntoIterator for &'a $name {
            type Item = $ix;
            type IntoIter = std::iter::Map<bit_set::Iter<'a, u32>, fn(usize) -> $ix>;
            fn into_iter(self) -> Self::IntoIter {
                let mk: fn(usize) -> $ix = <$ix>::new;
                self.0.iter().map(mk)
            }
        }
    };
}

index_set! {
    /// A set of graph vertices.
    NodeSet, NodeIndex
}

index_set! {
    /// A set of graph edges.
    EdgeSet, EdgeIndex
}
