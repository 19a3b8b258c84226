//! Code pieces: the closed set of statements the engine may inject.
//!
//! Rendering is exact — downstream tests compare against the C text — so any
//! change here is a change to the injected-source format.

use std::collections::HashSet;
use std::fmt;

use crate::expr::{Expression, Word};

/// Preprocessor guard macro for one bug. Everything injected for bug N sits
/// inside `#ifdef RACEBENCH_BUG_N`.
pub fn bug_macro(bug_id: u32) -> String {
    format!("RACEBENCH_BUG_{bug_id}")
}

/// A single injected statement or block delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    AssignImm { var: String, imm: Word },
    AssignVar { var: String, rvar: String },
    AssignInput { var: String, index: usize },
    AssignExpr { var: String, expr: Expression },
    AssignControl { var: String, cond: Expression, rvar: String },
    IfCond(Expression),
    BlockEnd,
    LockAcquire(String),
    LockRelease(String),
    Wait { cv: String, lock: String },
    Notify(String),
    Sleep(u64),
    Crash(u32),
    IfdefBug(u32),
    IfdefEnd,
}

impl Piece {
    /// Indentation delta this piece applies to everything after it.
    pub fn indent_shift(&self) -> i32 {
        match self {
            Piece::IfCond(_) => 1,
            Piece::BlockEnd => -1,
            _ => 0,
        }
    }

    /// Names of every variable this piece reads (the assigned variable counts
    /// as read: assignments always fold the old value in).
    pub fn used_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        match self {
            Piece::AssignImm { var, .. } | Piece::AssignInput { var, .. } => {
                out.insert(var.clone());
            }
            Piece::AssignVar { var, rvar } => {
                out.insert(var.clone());
                out.insert(rvar.clone());
            }
            Piece::AssignExpr { var, expr } => {
                out.insert(var.clone());
                expr.used_vars_into(&mut out);
            }
            Piece::AssignControl { var, cond, rvar } => {
                out.insert(var.clone());
                out.insert(rvar.clone());
                cond.used_vars_into(&mut out);
            }
            Piece::IfCond(expr) => expr.used_vars_into(&mut out),
            Piece::LockAcquire(name) | Piece::LockRelease(name) | Piece::Notify(name) => {
                out.insert(name.clone());
            }
            Piece::Wait { cv, lock } => {
                out.insert(cv.clone());
                out.insert(lock.clone());
            }
            _ => {}
        }
        out
    }

    /// Names of every variable this piece may write.
    pub fn edit_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        match self {
            Piece::AssignImm { var, .. }
            | Piece::AssignVar { var, .. }
            | Piece::AssignInput { var, .. }
            | Piece::AssignExpr { var, .. }
            | Piece::AssignControl { var, .. } => {
                out.insert(var.clone());
            }
            Piece::LockAcquire(name) | Piece::LockRelease(name) | Piece::Notify(name) => {
                out.insert(name.clone());
            }
            Piece::Wait { cv, lock } => {
                out.insert(cv.clone());
                out.insert(lock.clone());
            }
            _ => {}
        }
        out
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Piece::AssignImm { var, imm } => write!(f, "{var} = {imm:#x};"),
            Piece::AssignVar { var, rvar } => write!(f, "{var} = {rvar};"),
            Piece::AssignInput { var, index } => write!(
                f,
                "if ({index} < rb_input_size) {{ {var} = rb_input[{index}]; }}"
            ),
            Piece::AssignExpr { var, expr } => write!(f, "{var} = {expr};"),
            Piece::AssignControl { var, cond, rvar } => {
                write!(f, "if ({cond}) {{ {var} = {rvar}; }}")
            }
            Piece::IfCond(expr) => write!(f, "if ({expr}) {{"),
            Piece::BlockEnd => f.write_str("}"),
            Piece::LockAcquire(name) => write!(f, "pthread_mutex_lock(&({name}));"),
            Piece::LockRelease(name) => write!(f, "pthread_mutex_unlock(&({name}));"),
            Piece::Wait { cv, lock } => write!(f, "pthread_cond_wait(&({cv}), &({lock}));"),
            Piece::Notify(cv) => write!(f, "pthread_cond_signal(&({cv}));"),
            Piece::Sleep(us) => write!(f, "usleep({us});"),
            Piece::Crash(bug_id) => write!(f, "racebench_trigger({bug_id});"),
            Piece::IfdefBug(bug_id) => write!(f, "#ifdef {}", bug_macro(*bug_id)),
            Piece::IfdefEnd => f.write_str("#endif"),
        }
    }
}

/// Render a piece list to C lines with 4-space indentation tracked by the
/// pieces' indent shifts. A `BlockEnd` is rendered at the level it closes.
pub fn render_indented(pieces: &[Piece]) -> Vec<String> {
    const INDENT: &str = "    ";
    let mut level: i32 = 0;
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let new_level = level + piece.indent_shift();
        let cur_level = if matches!(piece, Piece::BlockEnd) {
            new_level
        } else {
            level
        };
        let prefix = INDENT.repeat(cur_level.max(0) as usize);
        out.push(format!("{prefix}{piece}"));
        level = new_level;
    }
    out
}
