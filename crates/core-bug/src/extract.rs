//! The bug builder: pre-bug define-use chains, pattern injection, assume
//! expansion, and the retrying extraction driver.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::{debug, info, warn};

use core_codegen::{CodeGenerator, VarKind};
use core_dom::DomOracle;
use core_ir::{ExprOp, Reserved, ReservedArg, ReservedExpr};
use core_model::{BugError, ThreadPointer};
use core_pattern::Params as PatternParams;
use core_trace::Trace;

use crate::log::AssumeOutcome;
use crate::placement::{StepMarker, generate_pattern};
use crate::runner;
use crate::walker::{LineFilter, TraceWalker};
use crate::Bug;

/// Knobs of one extraction run. Tests pin these to force specific
/// expansions; everything else uses the defaults.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Assume-expansion weights in `[Crash, Chain, Nest]` order. Nest is
    /// zeroed on the fly when fewer than two positions remain.
    pub assume_weights: [u32; 3],
    pub pattern: PatternParams,
    /// Soft-failure budget before the last error surfaces.
    pub fail_limit: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            assume_weights: [10, 3, 2],
            pattern: PatternParams::default(),
            fail_limit: 20,
        }
    }
}

/// Transient state of a single extraction attempt. Dropped wholesale on any
/// soft failure; nothing it does touches the filesystem.
pub struct ExtractState<'a, R: Rng> {
    trace: &'a Trace,
    opts: &'a ExtractOptions,
    dom: &'a mut dyn DomOracle,
    input_bytes: &'a [u8],
    rng: &'a mut R,
    codegen: CodeGenerator,
    walker: TraceWalker<'a>,
    pub bug: Bug,
}

impl<'a, R: Rng> ExtractState<'a, R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bug_id: u32,
        trace: &'a Trace,
        filter: &'a LineFilter,
        dom: &'a mut dyn DomOracle,
        opts: &'a ExtractOptions,
        input_file: &Path,
        input_bytes: &'a [u8],
        rng: &'a mut R,
    ) -> Self {
        Self {
            trace,
            opts,
            dom,
            input_bytes,
            rng,
            codegen: CodeGenerator::new(bug_id, input_bytes.to_vec()),
            walker: TraceWalker::new(trace, filter),
            bug: Bug::new(bug_id, input_file),
        }
    }

    /// A random trace index in `[start, stop)` with at least `count`
    /// injectable threads; sampled `stop - start` times before giving up.
    fn random_index(&mut self, count: usize, start: usize, stop: usize) -> Result<usize, BugError> {
        if start >= stop {
            return Err(BugError::NoPosition);
        }
        for _ in 0..stop - start {
            let index = self.rng.gen_range(start..stop);
            if self.walker.available_pos_at(index).len() >= count {
                return Ok(index);
            }
        }
        Err(BugError::NoPosition)
    }

    fn prob_old(editable: usize, path_len: usize) -> f64 {
        (editable as f64 * (2.0 / path_len as f64)).min(1.0)
    }

    /// New editable variable, or an existing one with probability growing in
    /// the number already live.
    fn select_edit_var(&mut self, path_len: usize) -> String {
        let editable = self.codegen.count_editable_vars();
        if Self::prob_old(editable, path_len) > self.rng.gen_range(0.0..1.0) {
            self.codegen.old_var(true)
        } else {
            self.codegen.new_var(VarKind::Normal, true)
        }
    }

    /// Build one bug from the walker's current cursor: a pre-bug define-use
    /// path, then a pattern whose guard compares a frozen variable against
    /// its lazily captured expected value. Chained assumes recurse with a
    /// halved horizon.
    pub fn add_bug(&mut self, path_len: usize) -> Result<()> {
        let start_index = self.walker.current;
        let path_len = path_len.min((self.trace.len() - start_index) / 2);
        let start2 = (start_index + 1 + path_len).min(self.trace.len() - 1);
        let bug_index = self.random_index(2, start2, self.trace.len())?;

        let mut pre_indexes: BTreeSet<usize> = BTreeSet::new();
        let mut attempts = 0usize;
        while pre_indexes.len() != path_len {
            attempts += 1;
            if attempts > (bug_index - start_index) * 4 + 32 {
                return Err(BugError::NoPosition.into());
            }
            pre_indexes.insert(self.random_index(1, start_index, bug_index)?);
        }

        debug!(
            target: "extract",
            bug_id = self.bug.bug_id,
            start_index,
            bug_index,
            path_len,
            "dua_path_chosen"
        );

        for index in pre_indexes {
            self.walker.move_to(index, &mut self.bug);
            let var = self.select_edit_var(path_len);
            let tpos = self.walker.get_one_pos(&mut self.bug, self.rng)?;
            let fl = tpos
                .location
                .as_ref()
                .expect("injectable positions carry locations")
                .file_line
                .clone();
            let assign = self.codegen.new_assign(&var, &[], self.rng);
            self.bug.append_code(&fl, assign);
            let loc = self.bug.ensure_site(&fl).exloc_current();
            self.bug.append_order(ThreadPointer::new(tpos.tid, Some(loc)));
            self.bug.log.add_location(tpos.tid, &fl);
        }

        self.walker.move_to(bug_index, &mut self.bug);
        let cond_var = self.codegen.old_var(false);
        self.codegen.set_editable(&cond_var, false);
        let cond = ReservedExpr::new(
            ExprOp::Eq,
            vec![
                ReservedArg::Var(cond_var.clone()),
                ReservedArg::Expected(cond_var),
            ],
        );
        let next_bug = self.add_pattern(cond)?;

        if next_bug {
            self.add_bug((path_len + 1) / 2)?;
        }
        Ok(())
    }

    /// Place a pattern whose every group is fenced by `pre_cond`. Returns
    /// whether a chained follow-up bug is required.
    fn add_pattern(&mut self, pre_cond: ReservedExpr) -> Result<bool> {
        let (pattern, marks0, marks1) = generate_pattern(
            &mut self.bug,
            &self.walker,
            &mut self.codegen,
            self.dom,
            &self.opts.pattern,
            self.rng,
        )?;

        // pair code groups with their markers in schedule order
        let name = pattern.name;
        let mut columns = [pattern.code0, pattern.code1];
        let marks = [marks0, marks1];
        let mut taken = [0usize; 2];
        let mut sequence: Vec<(Vec<Reserved>, StepMarker)> = Vec::new();
        for &part in pattern.order {
            let group = std::mem::take(&mut columns[part][taken[part]]);
            let marker = marks[part][taken[part]].clone();
            taken[part] += 1;
            sequence.push((group, marker));
        }

        self.bug.log.add_pattern(
            name,
            sequence
                .iter()
                .map(|(_, m)| (m.tid, m.file_line.clone()))
                .collect(),
        );

        let init_index = self.walker.current;
        let mut next_bug = false;
        for (mut codes, marker) in sequence {
            if init_index + marker.step > self.walker.current {
                self.walker.move_to(init_index + marker.step, &mut self.bug);
            }
            codes.insert(0, Reserved::IfCond(pre_cond.clone()));
            codes.push(Reserved::BlockEnd);
            for (i, code) in codes.into_iter().enumerate() {
                if let Reserved::Assume(expr) = code {
                    let outcome = self.pick_assume_outcome()?;
                    next_bug = self.expand_assume(expr, &marker, outcome)?;
                } else {
                    let is_guard = i == 0 && code.is_if_cond();
                    let code_index = self.bug.append_code(&marker.file_line, code);
                    let loc = self.bug.ensure_site(&marker.file_line).exloc_current();
                    let order_index = self
                        .bug
                        .append_order(ThreadPointer::new(marker.tid, Some(loc)));
                    if is_guard {
                        // the guard reads expected values; defer it until the
                        // schedule has produced them
                        self.bug
                            .set_after_order(&marker.file_line, code_index, order_index);
                    }
                }
            }
            self.walker.mark_use(marker.tid);
        }
        Ok(next_bug)
    }

    fn pick_assume_outcome(&mut self) -> Result<AssumeOutcome> {
        let mut weights = self.opts.assume_weights;
        if self.walker.available_pos(&mut self.bug).len() < 2 {
            weights[2] = 0;
        }
        let dist = WeightedIndex::new(weights)?;
        let outcome = [AssumeOutcome::Crash, AssumeOutcome::Chain, AssumeOutcome::Nest]
            [dist.sample(self.rng)];
        Ok(outcome)
    }

    /// Turn an abstract assume into concrete code: a guarded crash, a chain
    /// variable recording the violation for a follow-up bug, or a nested
    /// pattern whose guard is the negated predicate.
    fn expand_assume(
        &mut self,
        assume: ReservedExpr,
        marker: &StepMarker,
        outcome: AssumeOutcome,
    ) -> Result<bool> {
        let negated = ReservedExpr::new(ExprOp::Not, vec![ReservedArg::Expr(assume)]);
        self.bug.log.add_assume(outcome);
        let fl = &marker.file_line;
        let mut next_bug = false;
        match outcome {
            AssumeOutcome::Crash => {
                self.bug.append_code(fl, Reserved::IfCond(negated));
                self.bug.append_code(fl, Reserved::Crash(self.bug.bug_id));
                self.bug.append_code(fl, Reserved::BlockEnd);
            }
            AssumeOutcome::Chain => {
                // TODO: feed the chain variable into the follow-up bug's guard
                let var = self.codegen.new_var(VarKind::Normal, false);
                self.bug
                    .append_code(fl, Reserved::AssignExpr { var, expr: negated });
                next_bug = true;
            }
            AssumeOutcome::Nest => {
                next_bug = self.add_pattern(negated)?;
            }
        }
        let loc = self.bug.ensure_site(fl).exloc_current();
        self.bug
            .append_order(ThreadPointer::new(marker.tid, Some(loc)));
        Ok(next_bug)
    }

    /// Seal the sites, collect the variables, and run both simulation
    /// passes.
    pub fn implement(&mut self) -> Result<(), BugError> {
        self.bug.append_ifdef_end();
        self.bug.add_vars(self.codegen.list_all_vars());
        runner::run_generate(&mut self.bug, self.input_bytes)?;
        runner::run_check(&mut self.bug, self.input_bytes)?;
        Ok(())
    }

    pub fn into_bug(self) -> Bug {
        self.bug
    }
}

/// Retrying extraction driver. Soft failures restart with fresh randomness;
/// anything else aborts immediately.
pub struct BugExtractor<'a> {
    pub filter: &'a LineFilter,
    pub dom: &'a mut dyn DomOracle,
    pub opts: ExtractOptions,
}

impl BugExtractor<'_> {
    /// Extract one bug. `accept` is the external acceptance hook (naive
    /// trigger and reproduction checks); returning a soft error from it
    /// counts against the same retry budget.
    pub fn extract<R, A>(
        &mut self,
        bug_id: u32,
        trace: &Trace,
        input_file: &Path,
        input_bytes: &[u8],
        path_len: usize,
        rng: &mut R,
        accept: A,
    ) -> Result<Bug>
    where
        R: Rng,
        A: Fn(&Bug) -> Result<(), BugError>,
    {
        let mut fail_count = 0usize;
        loop {
            let attempt = self
                .attempt(bug_id, trace, input_file, input_bytes, path_len, rng)
                .and_then(|bug| {
                    accept(&bug)?;
                    Ok(bug)
                });
            match attempt {
                Ok(bug) => {
                    info!(
                        target: "extract",
                        bug_id,
                        attempts = fail_count + 1,
                        schedule_len = bug.order.len(),
                        sites = bug.iter_sites().count(),
                        "bug_extracted"
                    );
                    return Ok(bug);
                }
                Err(err) => match err.downcast::<BugError>() {
                    Ok(soft) => {
                        fail_count += 1;
                        warn!(
                            target: "extract",
                            bug_id,
                            attempt = fail_count,
                            error = %soft,
                            "extraction_retry"
                        );
                        if fail_count >= self.opts.fail_limit {
                            return Err(soft.into());
                        }
                    }
                    Err(hard) => return Err(hard),
                },
            }
        }
    }

    fn attempt<R: Rng>(
        &mut self,
        bug_id: u32,
        trace: &Trace,
        input_file: &Path,
        input_bytes: &[u8],
        path_len: usize,
        rng: &mut R,
    ) -> Result<Bug> {
        let mut state = ExtractState::new(
            bug_id,
            trace,
            self.filter,
            &mut *self.dom,
            &self.opts,
            input_file,
            input_bytes,
            rng,
        );
        state.add_bug(path_len)?;
        state.implement()?;
        Ok(state.into_bug())
    }
}
