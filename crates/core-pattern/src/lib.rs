//! The concurrency-bug pattern library.
//!
//! Six parameterized templates: three atomicity violations (WWA, RWA, WAW)
//! and three order violations (NoWait, Disorder, Sleep). Each template yields
//! two per-thread code columns, the order their groups execute in, and the
//! dominance constraint a second injection site must satisfy. The library is
//! a closed sum; adding a pattern means adding a variant and a match arm.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use core_codegen::{CodeGenerator, SLEEP_TIME_US, VarKind};
use core_dom::DomMode;
use core_ir::{DEFAULT_VALUE, ExprOp, Reserved, ReservedArg, ReservedExpr};

/// Minimum instruction count of a generated assignment-chain group. Groups
/// shorter than this make the race window too narrow to schedule around.
pub const MIN_ASSIGN_LEN: usize = 3;

/// Tunables of pattern generation.
#[derive(Debug, Clone)]
pub struct Params {
    /// Probability of wrapping a non-mandatory group in a fresh lock.
    pub lock_prob: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self { lock_prob: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Wwa,
    Rwa,
    Waw,
    NoWait,
    Disorder,
    Sleep,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Wwa,
        PatternKind::Rwa,
        PatternKind::Waw,
        PatternKind::NoWait,
        PatternKind::Disorder,
        PatternKind::Sleep,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Wwa => "WWA",
            PatternKind::Rwa => "RWA",
            PatternKind::Waw => "WAW",
            PatternKind::NoWait => "NoWait",
            PatternKind::Disorder => "Disorder",
            PatternKind::Sleep => "Sleep",
        }
    }
}

/// An instantiated pattern: two columns of per-site code groups, the global
/// group order (thread indices), and the placement constraint.
#[derive(Debug, Clone)]
pub struct BugPattern {
    pub name: &'static str,
    pub code0: Vec<Vec<Reserved>>,
    pub code1: Vec<Vec<Reserved>>,
    pub order: &'static [usize],
    pub dom_mode: DomMode,
    /// Every variable any group touches; placement avoids sites that already
    /// edit one of these.
    pub used_vars: HashSet<String>,
}

impl BugPattern {
    fn new(
        name: &'static str,
        code0: Vec<Vec<Reserved>>,
        code1: Vec<Vec<Reserved>>,
        order: &'static [usize],
        dom_mode: DomMode,
    ) -> Self {
        let mut used_vars = HashSet::new();
        for group in code0.iter().chain(code1.iter()) {
            for code in group {
                used_vars.extend(code.used_vars());
            }
        }
        Self {
            name,
            code0,
            code1,
            order,
            dom_mode,
            used_vars,
        }
    }
}

fn assume_eq(a: &str, b: &str) -> Reserved {
    Reserved::Assume(ReservedExpr::new(
        ExprOp::Eq,
        vec![
            ReservedArg::Var(a.to_owned()),
            ReservedArg::Var(b.to_owned()),
        ],
    ))
}

fn assign_var(var: &str, rvar: &str) -> Reserved {
    Reserved::AssignVar {
        var: var.to_owned(),
        rvar: rvar.to_owned(),
    }
}

/// Pick one of the six patterns uniformly and instantiate it.
pub fn random_pattern<R: Rng>(
    codegen: &mut CodeGenerator,
    params: &Params,
    rng: &mut R,
) -> BugPattern {
    let kind = *PatternKind::ALL.choose(rng).expect("pattern list non-empty");
    build(kind, codegen, params, rng)
}

/// Instantiate one pattern kind against the given variable registry.
pub fn build<R: Rng>(
    kind: PatternKind,
    codegen: &mut CodeGenerator,
    params: &Params,
    rng: &mut R,
) -> BugPattern {
    let (mut code0, mut code1, lock0, lock1, order, dom_mode): (
        Vec<Vec<Reserved>>,
        Vec<Vec<Reserved>>,
        Vec<bool>,
        Vec<bool>,
        &'static [usize],
        DomMode,
    ) = match kind {
        PatternKind::Wwa => {
            // thread0 publishes var through tvar and re-checks it after the
            // window; thread1's overwrite in between breaks the equality
            let var = codegen.new_var(VarKind::Normal, false);
            let tvar = codegen.new_var(VarKind::Normal, false);
            let mut v1 = codegen.new_assign_many(&tvar, MIN_ASSIGN_LEN, &[], rng);
            v1.push(assign_var(&var, &tvar));
            let v2 = codegen.new_assign_many(&var, MIN_ASSIGN_LEN, &[], rng);
            let ck = assume_eq(&var, &tvar);
            (
                vec![v1, vec![ck]],
                vec![v2],
                vec![true, false],
                vec![false],
                &[0, 1, 0],
                DomMode::PreOnly,
            )
        }
        PatternKind::Rwa => {
            // read-check on an existing variable; freezing keeps later DUA
            // chains from retargeting it
            let var = codegen.old_var(true);
            codegen.set_editable(&var, false);
            let tmp = codegen.new_var(VarKind::Normal, false);
            let v1 = assign_var(&tmp, &var);
            let v2 = codegen.new_assign_many(&var, MIN_ASSIGN_LEN, &[], rng);
            let ck = assume_eq(&var, &tmp);
            (
                vec![vec![v1], vec![ck]],
                vec![v2],
                vec![false, false],
                vec![false],
                &[0, 1, 0],
                DomMode::PreOnly,
            )
        }
        PatternKind::Waw => {
            let var = codegen.new_var(VarKind::Normal, false);
            // a chain into var is built and dropped here; the write below
            // goes through tmp1 instead, but the dropped build still
            // registers its temporaries and consumes randomness
            let _ = codegen.new_assign_many(&var, MIN_ASSIGN_LEN, &[], rng);
            let tmp1 = codegen.new_var(VarKind::Normal, true);
            let mut v1 = codegen.new_assign_many(&tmp1, MIN_ASSIGN_LEN, &[], rng);
            v1.push(assign_var(&var, &tmp1));
            let tmp2 = codegen.new_var(VarKind::Normal, false);
            let mut v2 = codegen.new_assign_many(&tmp2, MIN_ASSIGN_LEN, &[], rng);
            v2.push(assign_var(&var, &tmp2));
            let ck0 = Reserved::IfCond(ReservedExpr::new(
                ExprOp::Ne,
                vec![
                    ReservedArg::Var(var.clone()),
                    ReservedArg::Imm(DEFAULT_VALUE),
                ],
            ));
            let ck1 = assume_eq(&var, &tmp2);
            (
                vec![v1, v2],
                vec![vec![ck0, ck1, Reserved::BlockEnd]],
                vec![false, true],
                vec![false],
                &[0, 1, 0],
                DomMode::PostOnly,
            )
        }
        PatternKind::NoWait => {
            let tmp = codegen.new_var(VarKind::Normal, false);
            let var = codegen.new_var(VarKind::Normal, false);
            let mut v1 = codegen.new_assign_many(&tmp, MIN_ASSIGN_LEN, &[], rng);
            v1.push(assign_var(&var, &tmp));
            let ck = assume_eq(&var, &tmp);
            (
                vec![vec![ck]],
                vec![v1],
                vec![false],
                vec![true],
                &[0, 1],
                DomMode::Any,
            )
        }
        PatternKind::Disorder => {
            let var = codegen.new_var(VarKind::Normal, false);
            let tmp = codegen.new_var(VarKind::Normal, false);
            let cvar = codegen.new_var(VarKind::Normal, false);
            let cond = Reserved::IfCond(ReservedExpr::new(
                ExprOp::Ne,
                vec![
                    ReservedArg::Var(cvar.clone()),
                    ReservedArg::Imm(DEFAULT_VALUE),
                ],
            ));
            let c1 = Reserved::AssignImm {
                var: cvar,
                imm: DEFAULT_VALUE + 1,
            };
            let mut v1 = codegen.new_assign_many(&tmp, MIN_ASSIGN_LEN, &[], rng);
            v1.push(assign_var(&var, &tmp));
            let ck = assume_eq(&var, &tmp);
            (
                vec![vec![cond, ck, Reserved::BlockEnd]],
                vec![vec![c1], v1],
                vec![false],
                vec![false, true],
                &[1, 0, 1],
                DomMode::PostOnly,
            )
        }
        PatternKind::Sleep => {
            let tmp = codegen.new_var(VarKind::Normal, false);
            let var = codegen.new_var(VarKind::Normal, false);
            let mut v1 = codegen.new_assign_many(&tmp, MIN_ASSIGN_LEN, &[], rng);
            v1.push(assign_var(&var, &tmp));
            let ck = assume_eq(&var, &tmp);
            let v0 = vec![Reserved::Sleep(SLEEP_TIME_US)];
            (
                vec![v0, vec![ck]],
                vec![v1],
                vec![false, false],
                vec![true],
                &[0, 1, 0],
                DomMode::PreOnly,
            )
        }
    };

    add_locks(&mut code0, &lock0, &mut code1, &lock1, codegen, params, rng);
    BugPattern::new(kind.name(), code0, code1, order, dom_mode)
}

/// Wrap mandatory groups — and non-mandatory ones with `lock_prob` — in
/// acquire/release of a single fresh lock variable.
fn add_locks<R: Rng>(
    code0: &mut [Vec<Reserved>],
    lock0: &[bool],
    code1: &mut [Vec<Reserved>],
    lock1: &[bool],
    codegen: &mut CodeGenerator,
    params: &Params,
    rng: &mut R,
) {
    let lvar = codegen.new_var(VarKind::Lock, false);
    for (column, locks) in [(code0, lock0), (code1, lock1)] {
        for (group, mandatory) in column.iter_mut().zip(locks) {
            if !(*mandatory || rng.gen_bool(params.lock_prob)) {
                continue;
            }
            group.insert(0, Reserved::LockAcquire(lvar.clone()));
            group.push(Reserved::LockRelease(lvar.clone()));
        }
    }
}
