//! Randomized assignment generation.
//!
//! Every assignment the generator emits folds the target variable's old
//! value into the new one (`var = var op rhs`), so a definition placed early
//! in the trace stays observable at the race window no matter what the
//! pattern writes in between.

use indexmap::IndexMap;
use rand::Rng;
use rand::RngCore;
use rand::seq::SliceRandom;

use core_ir::{ExprOp, InputValue, Reserved, ReservedArg, ReservedExpr, Word};

use crate::variable::{VarKind, Variable};

/// Microseconds the sleep pattern stalls the checking thread.
pub const SLEEP_TIME_US: u64 = 100;

/// Probability of introducing a fresh random immediate instead of reusing an
/// existing variable inside a chain.
const PROB_RAND_IMM: f64 = 0.5;

const OPERATIONS: [ExprOp; 3] = [ExprOp::Add, ExprOp::Sub, ExprOp::Xor];

/// Registry entry for one normal/lock/condvar variable.
#[derive(Debug, Clone)]
pub struct VarData {
    pub var: Variable,
    pub editable: bool,
    pub use_count: usize,
}

impl VarData {
    fn is_normal(&self) -> bool {
        self.var.kind == VarKind::Normal
    }
}

/// Per-bug variable registry plus the assignment builders. All randomness
/// flows through the caller-supplied generator.
#[derive(Debug)]
pub struct CodeGenerator {
    bug_id: u32,
    input: Vec<u8>,
    vars: IndexMap<String, VarData>,
    count: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AssignKind {
    Imm,
    Input,
    Var,
    Control,
    Expr,
}

impl CodeGenerator {
    pub fn new(bug_id: u32, input: Vec<u8>) -> Self {
        Self {
            bug_id,
            input,
            vars: IndexMap::new(),
            count: 0,
        }
    }

    pub fn list_all_vars(&self) -> Vec<Variable> {
        self.vars.values().map(|v| v.var.clone()).collect()
    }

    pub fn random_value<R: Rng>(rng: &mut R) -> Word {
        rng.next_u32()
    }

    /// Registers a fresh variable and returns its full name.
    pub fn new_var(&mut self, kind: VarKind, editable: bool) -> String {
        let var = Variable::new(kind, self.bug_id, self.count);
        self.count += 1;
        let name = var.name.clone();
        self.vars.insert(
            name.clone(),
            VarData {
                var,
                editable,
                use_count: 0,
            },
        );
        name
    }

    /// Returns the least-used normal variable satisfying the editability
    /// constraint, creating one if the pool is empty. Ties go to the oldest
    /// variable. Bumps the use count of whatever is returned.
    pub fn old_var(&mut self, need_edit: bool) -> String {
        let mut candidate: Option<&VarData> = None;
        for v in self.vars.values() {
            if !v.is_normal() || (need_edit && !v.editable) {
                continue;
            }
            if candidate.is_none_or(|best| v.use_count < best.use_count) {
                candidate = Some(v);
            }
        }
        let candidate = candidate.map(|v| v.var.name.clone());
        let name = match candidate {
            Some(name) => name,
            None => self.new_var(VarKind::Normal, need_edit),
        };
        let data = self.vars.get_mut(&name).expect("variable just resolved");
        data.use_count += 1;
        name
    }

    pub fn count_editable_vars(&self) -> usize {
        self.vars.values().filter(|v| v.editable).count()
    }

    pub fn set_editable(&mut self, name: &str, editable: bool) {
        self.vars
            .get_mut(name)
            .unwrap_or_else(|| panic!("unknown variable {name}"))
            .editable = editable;
    }

    /// One mutating assignment of `var`, consuming every name in `use_vars`.
    /// The RHS strategy is chosen uniformly among those able to consume that
    /// many names.
    pub fn new_assign<R: Rng>(&mut self, var: &str, use_vars: &[String], rng: &mut R) -> Reserved {
        let mut kinds = Vec::new();
        if use_vars.is_empty() {
            kinds.push(AssignKind::Imm);
            if !self.input.is_empty() {
                kinds.push(AssignKind::Input);
            }
        }
        if use_vars.len() <= 1 {
            kinds.push(AssignKind::Var);
        }
        if use_vars.len() <= 2 {
            kinds.push(AssignKind::Control);
        }
        kinds.push(AssignKind::Expr);

        let kind = *kinds.choose(rng).expect("strategy list is never empty");
        let val = match kind {
            AssignKind::Imm => ReservedArg::Imm(Self::random_value(rng)),
            AssignKind::Input => ReservedArg::Input(InputValue {
                index: rng.gen_range(0..self.input.len()),
                fall_back: Self::random_value(rng),
            }),
            AssignKind::Var => {
                let rvar = match use_vars.first() {
                    Some(v) => v.clone(),
                    None => self.old_var(false),
                };
                ReservedArg::Var(rvar)
            }
            AssignKind::Control => self.control_value(use_vars, rng),
            AssignKind::Expr => ReservedArg::Expr(self.expr_value(use_vars, rng)),
        };
        let op = *OPERATIONS.choose(rng).expect("operations are non-empty");
        Reserved::AssignExpr {
            var: var.to_owned(),
            expr: ReservedExpr::new(op, vec![ReservedArg::Var(var.to_owned()), val]),
        }
    }

    /// `(use == expected(use)) ? rvar : <random imm>`. The expected value is
    /// captured from the simulator state when the piece materializes.
    fn control_value<R: Rng>(&mut self, use_vars: &[String], rng: &mut R) -> ReservedArg {
        let mut pool = use_vars.to_vec();
        let rvar = pool.pop().unwrap_or_else(|| self.old_var(false));
        let cvar = pool.pop().unwrap_or_else(|| self.old_var(false));
        let cond = ReservedExpr::new(
            ExprOp::Eq,
            vec![
                ReservedArg::Var(cvar.clone()),
                ReservedArg::Expected(cvar),
            ],
        );
        ReservedArg::Expr(ReservedExpr::new(
            ExprOp::Select,
            vec![
                ReservedArg::Expr(cond),
                ReservedArg::Var(rvar),
                ReservedArg::Imm(Self::random_value(rng)),
            ],
        ))
    }

    /// A left-folded chain over the required names plus a few filler terms.
    fn expr_value<R: Rng>(&mut self, use_vars: &[String], rng: &mut R) -> ReservedExpr {
        let mut vals: Vec<ReservedArg> =
            use_vars.iter().cloned().map(ReservedArg::Var).collect();
        for _ in 0..use_vars.len().max(1) {
            if rng.gen_bool(PROB_RAND_IMM) {
                vals.push(ReservedArg::Imm(Self::random_value(rng)));
            } else {
                vals.push(ReservedArg::Var(self.old_var(false)));
            }
        }
        vals.shuffle(rng);
        let mut acc = ReservedArg::Imm(Self::random_value(rng));
        for val in vals {
            let op = *OPERATIONS.choose(rng).expect("operations are non-empty");
            acc = ReservedArg::Expr(ReservedExpr::new(op, vec![acc, val]));
        }
        match acc {
            ReservedArg::Expr(e) => e,
            _ => unreachable!("fold consumed at least one term"),
        }
    }

    /// A define-use chain of at least `min_len` instructions feeding `var`.
    /// Heads seed fresh immediates or reuse old variables; the in-flight pool
    /// is reduced pairwise through fresh editable temporaries until one name
    /// remains, which folds into `var` at the tail.
    pub fn new_assign_many<R: Rng>(
        &mut self,
        var: &str,
        min_len: usize,
        use_vars: &[String],
        rng: &mut R,
    ) -> Vec<Reserved> {
        let mut out = Vec::new();
        let mut pool: Vec<String> = Vec::new();
        for v in use_vars {
            if !pool.contains(v) {
                pool.push(v.clone());
            }
        }
        for _ in 0..min_len {
            let v = if rng.gen_bool(PROB_RAND_IMM) {
                let v = self.new_var(VarKind::Normal, false);
                out.push(Reserved::AssignImm {
                    var: v.clone(),
                    imm: Self::random_value(rng),
                });
                v
            } else {
                self.old_var(false)
            };
            if !pool.contains(&v) {
                pool.push(v);
            }
        }

        while pool.len() > 1 {
            let mut num = rng.gen_range(0..=pool.len().min(2));
            if num == 0 && out.len() > min_len {
                num = 1;
            }
            let consumed: Vec<String> = pool[..num].to_vec();
            let v = self.new_var(VarKind::Normal, true);
            let assign = self.new_assign(&v, &consumed, rng);
            out.push(assign);
            pool.drain(..num);
            pool.push(v);
        }

        let tail = pool
            .first()
            .expect("assignment chain needs at least one source")
            .clone();
        let op = *OPERATIONS.choose(rng).expect("operations are non-empty");
        out.push(Reserved::AssignExpr {
            var: var.to_owned(),
            expr: ReservedExpr::new(
                op,
                vec![ReservedArg::Var(var.to_owned()), ReservedArg::Var(tail)],
            ),
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn fresh_variables_get_increasing_suffixes() {
        let mut cg = CodeGenerator::new(4, vec![1, 2, 3]);
        assert_eq!(cg.new_var(VarKind::Normal, true), "rb_state4.var_0");
        assert_eq!(cg.new_var(VarKind::Lock, false), "rb_state4.lock_1");
        assert_eq!(cg.new_var(VarKind::Normal, false), "rb_state4.var_2");
        assert_eq!(cg.list_all_vars().len(), 3);
    }

    #[test]
    fn old_var_prefers_least_used_and_respects_editability() {
        let mut cg = CodeGenerator::new(0, vec![]);
        let a = cg.new_var(VarKind::Normal, true);
        let b = cg.new_var(VarKind::Normal, false);
        cg.new_var(VarKind::Lock, false);

        // b has fewer uses after a is picked once
        assert_eq!(cg.old_var(false), a);
        assert_eq!(cg.old_var(false), b);
        // only a is editable
        assert_eq!(cg.old_var(true), a);
        assert_eq!(cg.old_var(true), a);
    }

    #[test]
    fn old_var_synthesizes_when_pool_is_empty() {
        let mut cg = CodeGenerator::new(0, vec![]);
        let v = cg.old_var(true);
        assert_eq!(v, "rb_state0.var_0");
        assert_eq!(cg.count_editable_vars(), 1);
    }

    #[test]
    fn new_assign_folds_the_target_variable() {
        let mut cg = CodeGenerator::new(0, vec![0xab; 8]);
        let mut r = rng(7);
        for _ in 0..32 {
            let a = cg.new_assign("rb_state0.var_9", &[], &mut r);
            let Reserved::AssignExpr { var, expr } = &a else {
                panic!("assignment must be an expression");
            };
            assert_eq!(var, "rb_state0.var_9");
            assert!(matches!(expr.args[0], ReservedArg::Var(ref v) if v == var));
        }
    }

    #[test]
    fn new_assign_consumes_every_required_variable() {
        let mut cg = CodeGenerator::new(0, vec![]);
        let mut r = rng(3);
        let needed = vec!["x".to_owned(), "y".to_owned(), "z".to_owned()];
        for _ in 0..16 {
            let a = cg.new_assign("t", &needed, &mut r);
            let used = a.used_vars();
            for v in &needed {
                assert!(used.contains(v), "missing required operand {v}");
            }
        }
    }

    #[test]
    fn chains_reach_the_minimum_length_and_end_in_the_target() {
        let mut cg = CodeGenerator::new(0, vec![5, 6]);
        let mut r = rng(11);
        let chain = cg.new_assign_many("rb_state0.var_42", 3, &[], &mut r);
        assert!(chain.len() >= 3 + 1);
        let Some(Reserved::AssignExpr { var, .. }) = chain.last() else {
            panic!("chain must fold into the target");
        };
        assert_eq!(var, "rb_state0.var_42");
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let build = |seed| {
            let mut cg = CodeGenerator::new(1, vec![9, 9, 9]);
            let mut r = rng(seed);
            cg.new_assign_many("rb_state1.var_99", 4, &[], &mut r)
        };
        assert_eq!(build(42), build(42));
        assert_ne!(build(42), build(43));
    }
}
