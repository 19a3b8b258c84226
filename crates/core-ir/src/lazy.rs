//! Reserved pieces: build-time descriptions that materialize into concrete
//! [`Piece`]s against the simulator's live state.
//!
//! The one operand that forces this two-phase design is `Expected(name)`:
//! "whatever value `name` holds when the schedule reaches this piece". It is
//! resolved exactly once, at materialize time, into an immediate.

use std::collections::HashSet;

use crate::expr::{ExprArg, ExprOp, Expression, InputValue, Word};
use crate::piece::Piece;
use crate::state::State;

/// One operand of a [`ReservedExpr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservedArg {
    Imm(Word),
    Var(String),
    Input(InputValue),
    /// Resolves to the simulator's current value of the named variable.
    Expected(String),
    Expr(ReservedExpr),
}

/// Lazy counterpart of [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedExpr {
    pub op: ExprOp,
    pub args: Vec<ReservedArg>,
}

impl ReservedExpr {
    pub fn new(op: ExprOp, args: Vec<ReservedArg>) -> Self {
        Self { op, args }
    }

    pub fn materialize(&self, state: &State) -> Expression {
        let args = self
            .args
            .iter()
            .map(|arg| match arg {
                ReservedArg::Imm(imm) => ExprArg::Imm(*imm),
                ReservedArg::Var(name) => ExprArg::Var(name.clone()),
                ReservedArg::Input(iv) => ExprArg::Input(iv.clone()),
                ReservedArg::Expected(name) => ExprArg::Imm(state.get_var(name)),
                ReservedArg::Expr(e) => ExprArg::Expr(Box::new(e.materialize(state))),
            })
            .collect();
        Expression::new(self.op, args)
    }

    /// Variables read at build time. `Expected` operands become immediates
    /// and therefore do not count as reads of the generated code.
    pub fn used_vars_into(&self, out: &mut HashSet<String>) {
        for arg in &self.args {
            match arg {
                ReservedArg::Var(name) => {
                    out.insert(name.clone());
                }
                ReservedArg::Expr(e) => e.used_vars_into(out),
                ReservedArg::Imm(_) | ReservedArg::Input(_) | ReservedArg::Expected(_) => {}
            }
        }
    }
}

/// Lazy counterpart of [`Piece`], plus `Assume` — an abstract predicate that
/// only exists before expansion and must never reach materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reserved {
    AssignImm { var: String, imm: Word },
    AssignVar { var: String, rvar: String },
    AssignInput { var: String, index: usize },
    AssignExpr { var: String, expr: ReservedExpr },
    AssignControl { var: String, cond: ReservedExpr, rvar: String },
    IfCond(ReservedExpr),
    BlockEnd,
    Assume(ReservedExpr),
    LockAcquire(String),
    LockRelease(String),
    Wait { cv: String, lock: String },
    Notify(String),
    Sleep(u64),
    Crash(u32),
    IfdefBug(u32),
    IfdefEnd,
}

impl Reserved {
    pub fn is_if_cond(&self) -> bool {
        matches!(self, Reserved::IfCond(_))
    }

    pub fn is_block_end(&self) -> bool {
        matches!(self, Reserved::BlockEnd)
    }

    pub fn is_assume(&self) -> bool {
        matches!(self, Reserved::Assume(_))
    }

    pub fn materialize(&self, state: &State) -> Piece {
        match self {
            Reserved::AssignImm { var, imm } => Piece::AssignImm {
                var: var.clone(),
                imm: *imm,
            },
            Reserved::AssignVar { var, rvar } => Piece::AssignVar {
                var: var.clone(),
                rvar: rvar.clone(),
            },
            Reserved::AssignInput { var, index } => Piece::AssignInput {
                var: var.clone(),
                index: *index,
            },
            Reserved::AssignExpr { var, expr } => Piece::AssignExpr {
                var: var.clone(),
                expr: expr.materialize(state),
            },
            Reserved::AssignControl { var, cond, rvar } => Piece::AssignControl {
                var: var.clone(),
                cond: cond.materialize(state),
                rvar: rvar.clone(),
            },
            Reserved::IfCond(expr) => Piece::IfCond(expr.materialize(state)),
            Reserved::BlockEnd => Piece::BlockEnd,
            Reserved::Assume(_) => panic!("assume must be expanded before materialization"),
            Reserved::LockAcquire(name) => Piece::LockAcquire(name.clone()),
            Reserved::LockRelease(name) => Piece::LockRelease(name.clone()),
            Reserved::Wait { cv, lock } => Piece::Wait {
                cv: cv.clone(),
                lock: lock.clone(),
            },
            Reserved::Notify(cv) => Piece::Notify(cv.clone()),
            Reserved::Sleep(us) => Piece::Sleep(*us),
            Reserved::Crash(bug_id) => Piece::Crash(*bug_id),
            Reserved::IfdefBug(bug_id) => Piece::IfdefBug(*bug_id),
            Reserved::IfdefEnd => Piece::IfdefEnd,
        }
    }

    /// Mirrors [`Piece::used_vars`] without materializing.
    pub fn used_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        match self {
            Reserved::AssignImm { var, .. } | Reserved::AssignInput { var, .. } => {
                out.insert(var.clone());
            }
            Reserved::AssignVar { var, rvar } => {
                out.insert(var.clone());
                out.insert(rvar.clone());
            }
            Reserved::AssignExpr { var, expr } => {
                out.insert(var.clone());
                expr.used_vars_into(&mut out);
            }
            Reserved::AssignControl { var, cond, rvar } => {
                out.insert(var.clone());
                out.insert(rvar.clone());
                cond.used_vars_into(&mut out);
            }
            Reserved::IfCond(expr) | Reserved::Assume(expr) => expr.used_vars_into(&mut out),
            Reserved::LockAcquire(name) | Reserved::LockRelease(name) | Reserved::Notify(name) => {
                out.insert(name.clone());
            }
            Reserved::Wait { cv, lock } => {
                out.insert(cv.clone());
                out.insert(lock.clone());
            }
            _ => {}
        }
        out
    }

    /// Mirrors [`Piece::edit_vars`] without materializing.
    pub fn edit_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        match self {
            Reserved::AssignImm { var, .. }
            | Reserved::AssignVar { var, .. }
            | Reserved::AssignInput { var, .. }
            | Reserved::AssignExpr { var, .. }
            | Reserved::AssignControl { var, .. } => {
                out.insert(var.clone());
            }
            Reserved::LockAcquire(name) | Reserved::LockRelease(name) | Reserved::Notify(name) => {
                out.insert(name.clone());
            }
            Reserved::Wait { cv, lock } => {
                out.insert(cv.clone());
                out.insert(lock.clone());
            }
            _ => {}
        }
        out
    }
}

/// A reserved piece queued at an injection site: the description, the
/// materialized piece once the generator pass has produced it, and the
/// schedule index before which materialization must not happen.
#[derive(Debug, Clone)]
pub struct LazyPiece {
    pub reserved: Reserved,
    pub piece: Option<Piece>,
    pub after_order: usize,
}

impl LazyPiece {
    pub fn new(reserved: Reserved) -> Self {
        Self {
            reserved,
            piece: None,
            after_order: 0,
        }
    }

    pub fn materialize(&mut self, state: &State) {
        self.piece = Some(self.reserved.materialize(state));
    }
}
