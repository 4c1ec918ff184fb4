//! # Control-flow restructuring
//!
//! Converts an arbitrary reducible-or-irreducible control-flow graph,
//! as recovered from low-level binary code, into a structured abstract
//! syntax tree built only from high-level constructs: sequences, if/else,
//! loops, switches with labeled cases, and the structured jumps `break`
//! and `continue`. No gotos are ever synthesized; irreducible flow is
//! removed by node cloning and by routing multi-entry and multi-exit
//! loops through synthesized state-variable dispatchers.
//!
//! The pipeline runs in three stages:
//!
//! 1. [`RegionCfg`] builds a mutable region graph from any [`CfgSource`]
//!    and *combs* it ([`RegionCfg::comb`]): loops collapse into nested
//!    body regions and the remaining acyclic graph is inflated until every
//!    conditional has a postdominator inside its region.
//! 2. [`ast::build`] lifts the combed region hierarchy into an
//!    [`AstTree`] using postdominator slicing.
//! 3. [`ast::beautify`] canonicalizes the tree: do-while and while
//!    promotion, dispatcher-switch inlining, dual-switch simplification
//!    and implicit-return marking.
//!
//! The whole pipeline is a synchronous pure function of its input; failures
//! are fatal and reported as [`StructureError`].

pub mod ast;
pub mod cfg;
pub mod error;
pub mod expr;

pub use crate::ast::{AstContext, AstContextMut, AstTree};
pub use crate::cfg::{CfgSource, RegionCfg};
pub use crate::error::{Result, StructureError};

use crate::expr::ExprContext;

/// Runs the whole pipeline: builds the region graph from `source`, combs
/// it, lifts it into an AST and beautifies the result.
pub fn restructure<'cd, S, C>(
    source: &S,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<AstTree<'cd, C>>
where
    S: CfgSource<Block = C::Block>,
    C: AstContextMut,
{
    let mut region = RegionCfg::from_source(source)?;
    region.comb()?;
    let mut tree = ast::build(&region, ectx, actx)?;
    ast::beautify(&mut tree, ectx, actx)?;
    Ok(tree)
}
