//! API for working with branch expressions.
//!
//! Expressions are arena-allocated and immutable after construction. Only
//! freely-copyable references are exposed through this API, so they can be
//! attached to several AST nodes without worrying about ownership.


use typed_arena::Arena;

use std::fmt;
use std::ptr;

/// An expression. This can be freely copied.
/// Use [`ExprContext`] to make one.
pub struct ExprRef<'cd, V: 'cd>(&'cd ExprVariants<'cd, V>);

enum ExprVariants<'cd, V: 'cd> {
    /// an opaque value produced by the input program
    Atomic(&'cd V),
    Not(ExprRef<'cd, V>),
    And(ExprRef<'cd, V>, ExprRef<'cd, V>),
    Or(ExprRef<'cd, V>, ExprRef<'cd, V>),
    Compare(CmpOp, &'cd V, &'cd V),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Helper for creating new expressions.
/// Use [`Storage::ectx`] to make one.
pub struct ExprContext<'cd, V: 'cd> {
    store: &'cd Storage<'cd, V>,
}

/// Backing storage for expressions.
pub struct Storage<'cd, V: 'cd> {
    values: Arena<V>,
    exprs: Arena<ExprVariants<'cd, V>>,
}

use self::ExprVariants::*;

impl<'cd, V> ExprContext<'cd, V> {
    pub fn mk_atomic(&self, v: V) -> ExprRef<'cd, V> {
        let v = self.store.values.alloc(v);
        self.store.mk_expr(Atomic(v))
    }

    pub fn mk_cmp(&self, op: CmpOp, lhs: V, rhs: V) -> ExprRef<'cd, V> {
        let lhs = self.store.values.alloc(lhs);
        let rhs = self.store.values.alloc(rhs);
        self.store.mk_expr(Compare(op, lhs, rhs))
    }

    pub fn mk_and(&self, l: ExprRef<'cd, V>, r: ExprRef<'cd, V>) -> ExprRef<'cd, V> {
        self.store.mk_expr(And(l, r))
    }

    pub fn mk_or(&self, l: ExprRef<'cd, V>, r: ExprRef<'cd, V>) -> ExprRef<'cd, V> {
        self.store.mk_expr(Or(l, r))
    }

    /// Negates `e`, collapsing double negation.
    pub fn mk_not(&self, e: ExprRef<'cd, V>) -> ExprRef<'cd, V> {
        match e.0 {
            &Not(inner) => inner,
            _ => self.store.mk_expr(Not(e)),
        }
    }
}

/// Converts expressions into another form, bottom up. Implemented by the
/// emitter; see [`ExprRef::fold`].
pub trait Folder<V> {
    type Output;

    fn atomic(&mut self, value: &V) -> Self::Output;
    fn not(&mut self, operand: Self::Output) -> Self::Output;
    fn and(&mut self, lhs: Self::Output, rhs: Self::Output) -> Self::Output;
    fn or(&mut self, lhs: Self::Output, rhs: Self::Output) -> Self::Output;
    fn compare(&mut self, op: CmpOp, lhs: &V, rhs: &V) -> Self::Output;
}

impl<'cd, V> ExprRef<'cd, V> {
    pub fn is_atomic(self) -> bool {
        matches!(self.0, Atomic(_))
    }

    /// Folds the expression with `folder`, operands before operators.
    pub fn fold<F: Folder<V>>(self, folder: &mut F) -> F::Output {
        match self.0 {
            &Atomic(v) => folder.atomic(v),
            &Not(e) => {
                let e = e.fold(folder);
                folder.not(e)
            }
            &And(l, r) => {
                let l = l.fold(folder);
                let r = r.fold(folder);
                folder.and(l, r)
            }
            &Or(l, r) => {
                let l = l.fold(folder);
                let r = r.fold(folder);
                folder.or(l, r)
            }
            &Compare(op, l, r) => folder.compare(op, l, r),
        }
    }

    /// The value behind an `Atomic` expression, if this is one.
    pub fn atomic_value(self) -> Option<&'cd V> {
        match self.0 {
            &Atomic(v) => Some(v),
            _ => None,
        }
    }

    /// Number of operators in the expression.
    pub fn complexity(self) -> usize {
        match self.0 {
            Atomic(_) | Compare(..) => 0,
            Not(e) => 1 + e.complexity(),
            And(l, r) | Or(l, r) => 1 + l.complexity() + r.complexity(),
        }
    }
}

impl<'cd, V> Storage<'cd, V> {
    pub fn new() -> Self {
        Self {
            values: Arena::new(),
            exprs: Arena::new(),
        }
    }

    pub fn ectx(&'cd self) -> ExprContext<'cd, V> {
        ExprContext { store: self }
    }

    fn mk_expr(&'cd self, e: ExprVariants<'cd, V>) -> ExprRef<'cd, V> {
        ExprRef(self.exprs.alloc(e))
    }
}

impl<'cd, V> Default for Storage<'cd, V> {
    fn default() -> Self {
        Self::new()
    }
}

// manual impls because `#[derive]` would require `V: Clone/Eq`

impl<'cd, V> Copy for ExprRef<'cd, V> {}
impl<'cd, V> Clone for ExprRef<'cd, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'cd, V> Copy for ExprContext<'cd, V> {}
impl<'cd, V> Clone for ExprContext<'cd, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'cd, V> Eq for ExprRef<'cd, V> {}
impl<'cd, V> PartialEq for ExprRef<'cd, V> {
    /// Structural equality; atoms compare by referent identity.
    fn eq(&self, rhs: &Self) -> bool {
        match (self.0, rhs.0) {
            (&Atomic(l), &Atomic(r)) => ptr::eq(l, r),
            (&Not(l), &Not(r)) => l == r,
            (&And(l0, l1), &And(r0, r1)) | (&Or(l0, l1), &Or(r0, r1)) => l0 == r0 && l1 == r1,
            (&Compare(lop, la, lb), &Compare(rop, ra, rb)) => {
                lop == rop && ptr::eq(la, ra) && ptr::eq(lb, rb)
            }
            _ => false,
        }
    }
}

impl<'cd, V: fmt::Debug> fmt::Debug for ExprRef<'cd, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Atomic(v) => write!(f, "{:?}", v),
            Not(e) => write!(f, "Not({:?})", e),
            And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            Compare(op, l, r) => write!(f, "Cmp({:?}, {:?}, {:?})", op, l, r),
        }
    }
}

impl<'cd, V> fmt::Debug for Storage<'cd, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("<Storage>")
    }
}

impl<'cd, V> fmt::Debug for ExprContext<'cd, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("<ExprContext>")
    }
}
