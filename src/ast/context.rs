//! Hooks connecting the restructurer to the surrounding decompiler.
//!
//! The tree never looks inside a code block or a value; everything it needs
//! to know about them goes through these traits, so tests can back them with
//! plain strings.

use super::DispatcherKind;

pub trait AstContext {
    /// Handle to an original code block.
    type Block: Clone;
    /// Handle to a value computed by the input program.
    type Value: Clone;

    /// The value deciding the two-way branch that ends `block`, if any.
    fn branch_condition(&self, block: &Self::Block) -> Option<Self::Value>;

    /// The value a switch ending `block` dispatches over, if any.
    fn switch_value(&self, block: &Self::Block) -> Option<Self::Value>;

    /// Whether `block` ends in a return instruction.
    fn is_return_block(&self, block: &Self::Block) -> bool;
}

pub trait AstContextMut: AstContext {
    /// A value representing `state variable == val` for the given kind of
    /// dispatcher.
    fn mk_state_eq(&mut self, kind: DispatcherKind, val: u64) -> Self::Value;

    /// A value representing the literal case label `val`.
    fn mk_label_const(&mut self, val: u64) -> Self::Value;
}
