//! The two simulation passes over a built schedule.
//!
//! Generator pass: materializes lazy pieces against the live state — but
//! never before their `after_order` barrier — and proves the interleaving
//! follows legal control flow. Checker pass: re-runs the now-concrete pieces
//! and proves the crash actually fires.

use core_exec::{ExecMode, InterleaveExec, PieceExecutor, PieceSink};
use core_ir::Reserved;
use core_model::{BugError, FileLine};

use crate::Bug;

struct BugRun<'a, 'b> {
    bug: &'a mut Bug,
    exec: PieceExecutor<'b>,
    generate: bool,
}

impl PieceSink for BugRun<'_, '_> {
    fn execute(
        &mut self,
        order_index: usize,
        file_line: &FileLine,
        code_ptr: usize,
    ) -> Result<(), BugError> {
        let site = self
            .bug
            .site_mut(file_line)
            .unwrap_or_else(|| panic!("schedule references missing site {file_line}"));
        let lazy = &mut site.codes_mut()[code_ptr];
        if lazy.piece.is_none() {
            assert!(
                self.generate,
                "checker pass reached an unmaterialized piece at {file_line}"
            );
            if order_index < lazy.after_order {
                // too early to materialize; only the block structure advances
                match &lazy.reserved {
                    Reserved::IfCond(_) => self.exec.state.inc_skip_level(),
                    Reserved::BlockEnd => self.exec.state.dec_skip_level(),
                    _ => {}
                }
                return Ok(());
            }
            lazy.materialize(&self.exec.state);
        }
        let piece = lazy.piece.clone().expect("piece just materialized");
        self.exec.run(&piece)
    }

    fn site_len(&self, file_line: &FileLine) -> usize {
        self.bug.site_len(file_line)
    }
}

fn run_pass(bug: &mut Bug, input: &[u8], mode: ExecMode) -> Result<bool, BugError> {
    let mut schedule = InterleaveExec::new(&bug.order);
    let mut run = BugRun {
        bug,
        exec: PieceExecutor::new(input, mode),
        generate: mode == ExecMode::Generate,
    };
    while schedule.step(&mut run)? {
        if run.exec.state.should_skip() {
            return Err(BugError::CantFollowOrder);
        }
    }
    Ok(run.exec.triggered())
}

/// Generator pass; fails with `CantFollowOrder` when a scheduled entry lands
/// inside a skipped region.
pub fn run_generate(bug: &mut Bug, input: &[u8]) -> Result<(), BugError> {
    run_pass(bug, input, ExecMode::Generate)?;
    Ok(())
}

/// Checker pass; additionally fails with `CantTrigger` when the schedule
/// completes without the crash firing.
pub fn run_check(bug: &mut Bug, input: &[u8]) -> Result<(), BugError> {
    let triggered = run_pass(bug, input, ExecMode::Check)?;
    if !triggered {
        return Err(BugError::CantTrigger);
    }
    Ok(())
}
