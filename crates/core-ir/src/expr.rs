//! Expression nodes of the injected-code IR.

use std::collections::HashSet;
use std::fmt;

/// The 32-bit machine word all injected arithmetic operates on. Semantics are
/// wrapping throughout; overflow is never an error.
pub type Word = u32;

/// Value of any state variable that has not been written yet.
pub const DEFAULT_VALUE: Word = 0;

/// Operators the expression evaluator understands. Division and modulo are
/// deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
    Sub,
    Xor,
    Not,
    Eq,
    Ne,
    /// Non-short-circuit in the abstract evaluator: both sides are always
    /// evaluated. Generated code never puts side effects inside `&&`, so the
    /// divergence from C is harmless.
    And,
    /// Three-argument conditional, `(c) ? (t) : (f)`.
    Select,
}

impl ExprOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ExprOp::Add => "+",
            ExprOp::Sub => "-",
            ExprOp::Xor => "^",
            ExprOp::Not => "!",
            ExprOp::Eq => "==",
            ExprOp::Ne => "!=",
            ExprOp::And => "&&",
            ExprOp::Select => "?:",
        }
    }
}

/// A read of one mutated-input byte with a compile-time fallback for short
/// inputs. Renders to a guarded `rb_input` access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputValue {
    pub index: usize,
    pub fall_back: Word,
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{index} < rb_input_size ? (uint32_t)rb_input[{index}] : {fall_back:#x}",
            index = self.index,
            fall_back = self.fall_back
        )
    }
}

/// One operand of an [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprArg {
    Imm(Word),
    Var(String),
    Input(InputValue),
    Expr(Box<Expression>),
}

impl fmt::Display for ExprArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprArg::Imm(imm) => write!(f, "{imm:#x}"),
            ExprArg::Var(name) => f.write_str(name),
            ExprArg::Input(iv) => iv.fmt(f),
            ExprArg::Expr(e) => e.fmt(f),
        }
    }
}

/// An operator applied to one, two, or (for `?:`) three operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub op: ExprOp,
    pub args: Vec<ExprArg>,
}

impl Expression {
    pub fn new(op: ExprOp, args: Vec<ExprArg>) -> Self {
        Self { op, args }
    }

    /// Names of every variable read anywhere in the expression tree.
    pub fn used_vars(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.used_vars_into(&mut out);
        out
    }

    pub(crate) fn used_vars_into(&self, out: &mut HashSet<String>) {
        for arg in &self.args {
            match arg {
                ExprArg::Var(name) => {
                    out.insert(name.clone());
                }
                ExprArg::Expr(e) => e.used_vars_into(out),
                ExprArg::Imm(_) | ExprArg::Input(_) => {}
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.args.as_slice() {
            [a] => write!(f, "{}({a})", self.op.symbol()),
            [a, b] => write!(f, "({a}) {} ({b})", self.op.symbol()),
            [c, t, e] if self.op == ExprOp::Select => write!(f, "({c}) ? ({t}) : ({e})"),
            _ => panic!(
                "malformed expression: {} with {} args",
                self.op.symbol(),
                self.args.len()
            ),
        }
    }
}
