//! Beautification passes over the structured tree.
//!
//! Each pass is a local rewrite run to a fixed point; replacements are
//! collected in an old-to-new substitution map and applied in a single
//! [`AstTree::update_references`] walk.

use super::context::AstContextMut;
use super::{AstKind, AstNodeId, AstTree, DispatcherKind, LoopKind};
use crate::error::Result;
use crate::expr::{CmpOp, ExprContext, ExprRef};

use log::debug;

use std::collections::HashMap;

pub fn beautify<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<()> {
    promote_do_while(tree, ectx)?;
    promote_while(tree, ectx)?;
    // dispatcher switches must be inlined before dual-switch simplification:
    // the `If` produced there no longer carries the dispatcher kind
    inline_dispatcher_switches(tree, ectx, actx)?;
    simplify_dual_switches(tree, ectx, actx)?;
    mark_implicit_returns(tree, actx)?;
    if cfg!(debug_assertions) {
        tree.validate()?;
    }
    Ok(())
}

/// How an `If` arm participates in a loop-exit check.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Arm {
    Nothing,
    Continue,
    Break,
    Other,
}

fn arm_of<'cd, C: AstContextMut>(tree: &AstTree<'cd, C>, arm: Option<AstNodeId>) -> Arm {
    match arm {
        None => Arm::Nothing,
        Some(id) => match tree.kind(id) {
            AstKind::Continue {
                computation: None, ..
            } => Arm::Continue,
            AstKind::Break { .. } => Arm::Break,
            _ => Arm::Other,
        },
    }
}

/// The first element of a loop body: the body itself, or the opening child
/// of a body sequence.
fn first_of_body<'cd, C: AstContextMut>(tree: &AstTree<'cd, C>, body: AstNodeId) -> AstNodeId {
    match tree.kind(body) {
        AstKind::Sequence { children } if !children.is_empty() => children[0],
        _ => body,
    }
}

/// `Scs(WhileTrue)` whose body ends in `if (c) continue;` becomes a
/// do-while over `c`; the terminal check leaves the body and survives as
/// the loop's related condition.
fn promote_do_while<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
) -> Result<()> {
    loop {
        let mut changed = false;
        for id in tree.reachable() {
            changed |= try_promote_do_while(tree, ectx, id);
        }
        if !changed {
            return Ok(());
        }
    }
}

fn try_promote_do_while<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    id: AstNodeId,
) -> bool {
    let body = match tree.kind(id) {
        AstKind::Scs {
            body: Some(b),
            loop_kind: LoopKind::WhileTrue,
            ..
        } => *b,
        _ => return false,
    };
    // only a sequence can spare its last element; a body that *is* the
    // check would become an empty loop
    let last = match tree.kind(body) {
        AstKind::Sequence { children } if children.len() >= 2 => *children.last().unwrap(),
        _ => return false,
    };
    let (then, else_) = match tree.kind(last) {
        AstKind::If { then, else_, .. } => (*then, *else_),
        _ => return false,
    };
    let negate = match (arm_of(tree, then), arm_of(tree, else_)) {
        (Arm::Continue, Arm::Break) | (Arm::Continue, Arm::Nothing) => false,
        (Arm::Break, Arm::Continue) | (Arm::Nothing, Arm::Continue) => true,
        _ => return false,
    };

    if negate {
        // absorb the negation into the promoted condition
        if let AstKind::If { cond, then, else_, .. } = tree.kind_mut(last) {
            *cond = ectx.mk_not(*cond);
            std::mem::swap(then, else_);
        }
    }
    if let AstKind::Sequence { children } = tree.kind_mut(body) {
        children.pop();
    }
    let new_body = match tree.kind(body) {
        AstKind::Sequence { children } if children.len() == 1 => children[0],
        _ => body,
    };
    if let AstKind::Scs {
        body,
        loop_kind,
        related,
    } = tree.kind_mut(id)
    {
        *body = Some(new_body);
        *loop_kind = LoopKind::DoWhile;
        *related = Some(last);
    }
    // remaining continues re-evaluate the loop condition before jumping
    set_continue_computation(tree, new_body, last);
    debug!("promoted {} to do-while", id);
    true
}

fn set_continue_computation<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    id: AstNodeId,
    computation_if: AstNodeId,
) {
    if let AstKind::Continue { computation, .. } = tree.kind_mut(id) {
        if computation.is_none() {
            *computation = Some(computation_if);
        }
        return;
    }
    if matches!(tree.kind(id), AstKind::Scs { .. }) {
        return;
    }
    for child in tree.children(id) {
        set_continue_computation(tree, child, computation_if);
    }
}

/// `Scs(WhileTrue)` whose body starts with `if (c) ... else break;` (or the
/// mirror) becomes a while over `c`; the break arm is dropped and the kept
/// arm is spliced in front of the remaining body.
fn promote_while<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
) -> Result<()> {
    loop {
        let mut changed = false;
        for id in tree.reachable() {
            changed |= try_promote_while(tree, ectx, id);
        }
        if !changed {
            return Ok(());
        }
    }
}

fn try_promote_while<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    id: AstNodeId,
) -> bool {
    let body = match tree.kind(id) {
        AstKind::Scs {
            body: Some(b),
            loop_kind: LoopKind::WhileTrue,
            ..
        } => *b,
        _ => return false,
    };
    let first = first_of_body(tree, body);
    let (then, else_) = match tree.kind(first) {
        AstKind::If { then, else_, .. } => (*then, *else_),
        _ => return false,
    };
    // one arm must leave the loop immediately; the other is kept
    let (kept, negate) = match (arm_of(tree, then), arm_of(tree, else_)) {
        (_, Arm::Break) if arm_of(tree, then) != Arm::Break => (then, false),
        (Arm::Break, _) if arm_of(tree, else_) != Arm::Break => (else_, true),
        _ => return false,
    };

    // rebuild the body without the exit check
    let mut elems = Vec::new();
    if let Some(kept) = kept {
        push_spliced(tree, &mut elems, kept);
    }
    if let AstKind::Sequence { children } = tree.kind(body) {
        elems.extend(children.iter().skip(1).copied());
    }
    if elems.is_empty() {
        return false;
    }

    if negate {
        if let AstKind::If { cond, then, else_, .. } = tree.kind_mut(first) {
            *cond = ectx.mk_not(*cond);
            std::mem::swap(then, else_);
        }
    }
    // a continue in terminal position is implied by the loop itself
    if let Some(&last) = elems.last() {
        if let AstKind::Continue {
            computation: None,
            implicit,
        } = tree.kind_mut(last)
        {
            *implicit = true;
        }
    }
    let new_body = if elems.len() == 1 {
        elems[0]
    } else {
        tree.add("sequence", None, AstKind::Sequence { children: elems })
    };
    if let AstKind::Scs {
        body,
        loop_kind,
        related,
    } = tree.kind_mut(id)
    {
        *body = Some(new_body);
        *loop_kind = LoopKind::While;
        *related = Some(first);
    }
    debug!("promoted {} to while", id);
    true
}

fn push_spliced<'cd, C: AstContextMut>(
    tree: &AstTree<'cd, C>,
    elems: &mut Vec<AstNodeId>,
    id: AstNodeId,
) {
    if let AstKind::Sequence { children } = tree.kind(id) {
        elems.extend(children.iter().copied());
    } else {
        elems.push(id);
    }
}

/// A dispatcher switch with one case is replaced by that case; one with two
/// cases is promoted to an `If` over the state-variable equality. Runs to a
/// fixed point so dispatchers nested in inlined cases are handled too.
fn inline_dispatcher_switches<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<()> {
    loop {
        let mut map: HashMap<AstNodeId, AstNodeId> = HashMap::new();
        for id in tree.reachable() {
            if map.contains_key(&id) {
                continue;
            }
            let (dispatcher, cases) = match tree.kind(id) {
                AstKind::Switch {
                    dispatcher, cases, ..
                } if *dispatcher != DispatcherKind::NotDispatcher => {
                    (*dispatcher, cases.clone())
                }
                _ => continue,
            };
            let replacement = match cases.len() {
                1 => {
                    debug!("inlining single-case dispatcher switch {}", id);
                    match purge_switch_breaks(tree, cases[0].body, id) {
                        Some(b) => b,
                        None => tree.add(
                            "empty",
                            None,
                            AstKind::Code {
                                implicit_return: false,
                            },
                        ),
                    }
                }
                2 => {
                    let (labeled, other) = if cases[0].labels.is_empty() {
                        (&cases[1], &cases[0])
                    } else {
                        (&cases[0], &cases[1])
                    };
                    let label = match labeled.labels.iter().next() {
                        Some(&l) => l,
                        // two defaults cannot happen; two unlabeled cases
                        // mean this is not a dispatcher we can promote
                        None => continue,
                    };
                    debug!("promoting two-case dispatcher switch {} to if", id);
                    let cond = ectx.mk_atomic(actx.mk_state_eq(dispatcher, label));
                    let then = purge_switch_breaks(tree, labeled.body, id);
                    let else_ = purge_switch_breaks(tree, other.body, id);
                    mk_dispatcher_if(tree, ectx, cond, then, else_)
                }
                _ => continue,
            };
            map.insert(id, replacement);
        }
        if map.is_empty() {
            return Ok(());
        }
        tree.update_references(&map);
    }
}

fn mk_dispatcher_if<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    cond: ExprRef<'cd, C::Value>,
    then: Option<AstNodeId>,
    else_: Option<AstNodeId>,
) -> AstNodeId {
    let (cond, then, else_) = match (then, else_) {
        (None, Some(e)) => (ectx.mk_not(cond), Some(e), None),
        (t, e) => (cond, t, e),
    };
    if then.is_none() && else_.is_none() {
        return tree.add(
            "empty",
            None,
            AstKind::Code {
                implicit_return: false,
            },
        );
    }
    tree.add(
        "dispatcher_if",
        None,
        AstKind::If {
            cond,
            then,
            else_,
            weaved: false,
        },
    )
}

/// Removes the `SwitchBreak`s belonging to `sw` from the subtree at `id`;
/// after the switch is gone they are plain fall-through. Returns the
/// replacement subtree, or `None` when it vanishes entirely.
fn purge_switch_breaks<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    id: AstNodeId,
    sw: AstNodeId,
) -> Option<AstNodeId> {
    match tree.kind(id) {
        AstKind::SwitchBreak { parent } if *parent == sw => None,
        AstKind::Sequence { children } => {
            let children = children.clone();
            let kept: Vec<AstNodeId> = children
                .into_iter()
                .filter_map(|c| purge_switch_breaks(tree, c, sw))
                .collect();
            match kept.len() {
                0 => None,
                1 => Some(kept[0]),
                _ => {
                    if let AstKind::Sequence { children } = tree.kind_mut(id) {
                        *children = kept;
                    }
                    Some(id)
                }
            }
        }
        AstKind::If { then, else_, .. } => {
            let (t, e) = (*then, *else_);
            let t = t.and_then(|t| purge_switch_breaks(tree, t, sw));
            let e = e.and_then(|e| purge_switch_breaks(tree, e, sw));
            if let AstKind::If { then, else_, .. } = tree.kind_mut(id) {
                *then = t;
                *else_ = e;
            }
            Some(id)
        }
        // a loop boundary: switch breaks cannot cross it
        AstKind::Scs { .. } => Some(id),
        AstKind::Switch { cases, .. } => {
            let bodies: Vec<AstNodeId> = cases.iter().map(|c| c.body).collect();
            let bodies: Vec<AstNodeId> = bodies
                .into_iter()
                .map(|b| match purge_switch_breaks(tree, b, sw) {
                    Some(b) => b,
                    None => tree.add(
                        "empty case",
                        None,
                        AstKind::Code {
                            implicit_return: false,
                        },
                    ),
                })
                .collect();
            if let AstKind::Switch { cases, .. } = tree.kind_mut(id) {
                for (c, b) in cases.iter_mut().zip(bodies) {
                    c.body = b;
                }
            }
            Some(id)
        }
        _ => Some(id),
    }
}

/// A non-dispatcher switch with exactly two cases becomes an `If` over a
/// label equality; `weaved` is carried over from the switch.
fn simplify_dual_switches<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    ectx: ExprContext<'cd, C::Value>,
    actx: &mut C,
) -> Result<()> {
    loop {
        let mut map: HashMap<AstNodeId, AstNodeId> = HashMap::new();
        for id in tree.reachable() {
            if map.contains_key(&id) {
                continue;
            }
            let (cond_val, cases, weaved) = match tree.kind(id) {
                AstKind::Switch {
                    cond: Some(c),
                    cases,
                    weaved,
                    dispatcher: DispatcherKind::NotDispatcher,
                    ..
                } if cases.len() == 2 => (c.clone(), cases.clone(), *weaved),
                _ => continue,
            };
            let (labeled, other) = if cases[0].labels.is_empty() {
                (&cases[1], &cases[0])
            } else {
                (&cases[0], &cases[1])
            };
            // the equality test only captures a single label
            if labeled.labels.len() != 1 {
                continue;
            }
            let label = *labeled.labels.iter().next().unwrap();
            debug!("simplifying dual switch {} to if", id);

            let origin = tree.node(id).origin().cloned();
            let name = tree.node(id).name().to_owned();
            let label_val = actx.mk_label_const(label);
            let cond = ectx.mk_cmp(CmpOp::Eq, cond_val, label_val);
            let then = purge_switch_breaks(tree, labeled.body, id);
            let else_ = purge_switch_breaks(tree, other.body, id);
            let (cond, then, else_) = match (then, else_) {
                (None, Some(e)) => (ectx.mk_not(cond), Some(e), None),
                (t, e) => (cond, t, e),
            };
            let replacement = if then.is_none() && else_.is_none() {
                tree.add(
                    name,
                    origin,
                    AstKind::Code {
                        implicit_return: false,
                    },
                )
            } else {
                tree.add(
                    name,
                    origin,
                    AstKind::If {
                        cond,
                        then,
                        else_,
                        weaved,
                    },
                )
            };
            map.insert(id, replacement);
        }
        if map.is_empty() {
            return Ok(());
        }
        tree.update_references(&map);
    }
}

/// A terminal code node whose block ends in a return does not need the
/// return spelled out by the emitter.
fn mark_implicit_returns<'cd, C: AstContextMut>(
    tree: &mut AstTree<'cd, C>,
    actx: &C,
) -> Result<()> {
    let root = match tree.root() {
        Some(r) => r,
        None => return Ok(()),
    };
    let last = match tree.kind(root) {
        AstKind::Sequence { children } => match children.last() {
            Some(&l) => l,
            None => return Ok(()),
        },
        _ => root,
    };
    let is_ret = match (tree.kind(last), tree.node(last).origin()) {
        (AstKind::Code { .. }, Some(b)) => actx.is_return_block(b),
        _ => false,
    };
    if is_ret {
        if let AstKind::Code { implicit_return } = tree.kind_mut(last) {
            *implicit_return = true;
        }
        debug!("marked {} as implicit return", last);
    }
    Ok(())
}
