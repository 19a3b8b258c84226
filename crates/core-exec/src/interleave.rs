//! Deterministic walk of an interleave schedule.
//!
//! The executor tracks one "last location" per thread. Each schedule entry
//! advances its thread from that location to the entry's location, feeding
//! every piece crossed — in code-site order — to the sink exactly when it is
//! crossed. Sites are addressed by value; the sink owns the site table.

use core_model::{BugError, FileLine, Interleave, SiteLocation};

/// Receiver of crossed pieces during a schedule walk.
pub trait PieceSink {
    /// Called for each piece crossed, with the index of the schedule entry
    /// that caused the crossing.
    fn execute(
        &mut self,
        order_index: usize,
        file_line: &FileLine,
        code_ptr: usize,
    ) -> Result<(), BugError>;

    /// Current number of pieces at a site (resolves `Middle` locations).
    fn site_len(&self, file_line: &FileLine) -> usize;
}

/// Schedule walker. Holds a value copy of the schedule so the sink may own
/// (and mutate) the bug the schedule came from.
#[derive(Debug)]
pub struct InterleaveExec {
    entries: Vec<(usize, Option<SiteLocation>)>,
    threads: Vec<Option<SiteLocation>>,
    cur_index: usize,
}

impl InterleaveExec {
    pub fn new(order: &Interleave) -> Self {
        let entries: Vec<_> = order
            .iter()
            .map(|tp| (tp.tid, tp.location.clone()))
            .collect();
        let threads = vec![None; order.num_threads()];
        Self {
            entries,
            threads,
            cur_index: 0,
        }
    }

    /// Process the next schedule entry. Returns `Ok(false)` once the
    /// schedule is exhausted.
    pub fn step(&mut self, sink: &mut dyn PieceSink) -> Result<bool, BugError> {
        if self.cur_index >= self.entries.len() {
            return Ok(false);
        }
        let (tid, new_loc) = self.entries[self.cur_index].clone();
        self.cur_index += 1;
        let old_loc = self.threads[tid].take();
        self.move_exec(old_loc, new_loc.as_ref(), sink)?;
        self.threads[tid] = new_loc;
        Ok(true)
    }

    fn move_exec(
        &self,
        old_loc: Option<SiteLocation>,
        new_loc: Option<&SiteLocation>,
        sink: &mut dyn PieceSink,
    ) -> Result<(), BugError> {
        let Some(old) = old_loc else {
            return Ok(());
        };
        let old_ptr = old
            .code_ptr
            .unwrap_or_else(|| sink.site_len(&old.file_line));
        let Some(new) = new_loc else {
            // thread left traced code: flush its site
            let end = sink.site_len(&old.file_line);
            return self.exec_range(&old.file_line, old_ptr, end, sink);
        };
        let new_ptr = new
            .code_ptr
            .unwrap_or_else(|| sink.site_len(&new.file_line));
        if new_ptr == 0 {
            let end = sink.site_len(&old.file_line);
            self.exec_range(&old.file_line, old_ptr, end, sink)
        } else if old.file_line != new.file_line {
            let end = sink.site_len(&old.file_line);
            self.exec_range(&old.file_line, old_ptr, end, sink)?;
            self.exec_range(&new.file_line, 0, new_ptr, sink)
        } else {
            self.exec_range(&new.file_line, old_ptr, new_ptr, sink)
        }
    }

    fn exec_range(
        &self,
        file_line: &FileLine,
        from: usize,
        to: usize,
        sink: &mut dyn PieceSink,
    ) -> Result<(), BugError> {
        assert!(from <= to, "schedule regressed within a site");
        for ptr in from..to {
            sink.execute(self.cur_index - 1, file_line, ptr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::ThreadPointer;
    use std::collections::HashMap;

    struct Recorder {
        lens: HashMap<FileLine, usize>,
        seen: Vec<(usize, FileLine, usize)>,
    }

    impl PieceSink for Recorder {
        fn execute(
            &mut self,
            order_index: usize,
            file_line: &FileLine,
            code_ptr: usize,
        ) -> Result<(), BugError> {
            self.seen.push((order_index, file_line.clone(), code_ptr));
            Ok(())
        }

        fn site_len(&self, file_line: &FileLine) -> usize {
            self.lens.get(file_line).copied().unwrap_or(0)
        }
    }

    fn fl(line: usize) -> FileLine {
        FileLine::new("a.c", line)
    }

    fn at(tid: usize, line: usize, ptr: Option<usize>) -> ThreadPointer {
        ThreadPointer::new(tid, Some(SiteLocation::new(fl(line), ptr)))
    }

    #[test]
    fn same_site_executes_half_open_range() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(1)));
        order.push(at(0, 1, Some(3)));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 4)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(rec.seen, vec![(1, fl(1), 1), (1, fl(1), 2)]);
    }

    #[test]
    fn site_change_flushes_old_then_enters_new() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(1)));
        order.push(at(0, 2, Some(2)));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 3), (fl(2), 5)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(
            rec.seen,
            vec![(1, fl(1), 1), (1, fl(1), 2), (1, fl(2), 0), (1, fl(2), 1)]
        );
    }

    #[test]
    fn entering_at_start_only_flushes_the_old_site() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(1)));
        order.push(at(0, 2, Some(0)));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 2), (fl(2), 5)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(rec.seen, vec![(1, fl(1), 1)]);
    }

    #[test]
    fn terminated_thread_flushes_to_site_end() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(0)));
        order.push(ThreadPointer::new(0, None));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 2)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(rec.seen, vec![(1, fl(1), 0), (1, fl(1), 1)]);
    }

    #[test]
    fn middle_location_resolves_to_site_length() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(1)));
        order.push(at(0, 1, None));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 3)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(rec.seen, vec![(1, fl(1), 1), (1, fl(1), 2)]);
    }

    #[test]
    fn threads_keep_independent_positions() {
        let mut order = Interleave::new();
        order.push(at(0, 1, Some(1)));
        order.push(at(1, 2, Some(1)));
        order.push(at(0, 1, Some(2)));
        let mut rec = Recorder {
            lens: HashMap::from([(fl(1), 3), (fl(2), 3)]),
            seen: vec![],
        };
        let mut ix = InterleaveExec::new(&order);
        while ix.step(&mut rec).unwrap() {}
        assert_eq!(rec.seen, vec![(2, fl(1), 1)]);
    }
}
