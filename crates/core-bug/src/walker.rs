//! Trace walker: the builder's cursor into the recorded event order.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use core_model::{BugError, FileLine, LineLoc, ThreadPointer};
use core_trace::{Trace, ThreadPos};

use crate::Bug;

/// Pre-computed injection eligibility over the trace's file-lines. The
/// syntactic checker and both blacklists are folded in at construction, so
/// cursor-time lookups are pure and cheap.
#[derive(Debug, Default)]
pub struct LineFilter {
    eligible: HashSet<FileLine>,
}

impl LineFilter {
    /// Run `checker` once per distinct trace file-line. Lines in the trace
    /// blacklist are ineligible regardless of the checker's answer.
    pub fn build<F>(trace: &Trace, mut checker: F) -> Self
    where
        F: FnMut(&FileLine) -> bool,
    {
        let mut eligible = HashSet::new();
        for fl in trace.distinct_file_lines() {
            if trace.in_blacklist(&fl) {
                continue;
            }
            if checker(&fl) {
                eligible.insert(fl);
            }
        }
        Self { eligible }
    }

    /// Everything in the trace is eligible (minus the trace blacklist).
    pub fn allow_all(trace: &Trace) -> Self {
        Self::build(trace, |_| true)
    }

    pub fn allows(&self, file_line: &FileLine) -> bool {
        self.eligible.contains(file_line)
    }
}

/// Cursor over a trace. Moving the cursor appends the crossed events to the
/// bug's schedule; standing still, it enumerates the thread positions where
/// code may be injected right now.
#[derive(Debug)]
pub struct TraceWalker<'a> {
    trace: &'a Trace,
    filter: &'a LineFilter,
    pub current: usize,
    used_tids: HashSet<usize>,
}

impl<'a> TraceWalker<'a> {
    pub fn new(trace: &'a Trace, filter: &'a LineFilter) -> Self {
        Self {
            trace,
            filter,
            current: 0,
            used_tids: HashSet::new(),
        }
    }

    pub fn trace(&self) -> &Trace {
        self.trace
    }

    pub fn allows(&self, file_line: &FileLine) -> bool {
        self.filter.allows(file_line)
    }

    /// Advance to `index`, appending every crossed event to the schedule.
    /// Events observed mid-line point past the whole (still growing) site;
    /// everything else points at the site start. Clears the per-cursor used
    /// set only when the cursor actually moves.
    pub fn move_to(&mut self, index: usize, bug: &mut Bug) {
        assert!(index >= self.current, "walker cursor moved backwards");
        if index == self.current {
            return;
        }
        for i in self.current + 1..=index {
            let pos = self.trace.get(i);
            let tid = pos.tid;
            let line_loc = pos.line_loc;
            let location = pos.file_line.clone().map(|fl| {
                let site = bug.ensure_site(&fl);
                if line_loc == LineLoc::Middle {
                    site.exloc_middle()
                } else {
                    site.exloc_start()
                }
            });
            bug.append_order(ThreadPointer::with_line_loc(tid, location, line_loc));
        }
        self.current = index;
        self.used_tids.clear();
    }

    fn eligible_pos(&self, tid: usize) -> Option<&ThreadPos> {
        let pos = self.trace.thread_pos(tid, self.current);
        match &pos.file_line {
            Some(fl) if self.filter.allows(fl) => Some(pos),
            _ => None,
        }
    }

    /// Thread positions injectable at the cursor: one entry per unused
    /// thread whose last known event is a `Before` on an eligible line. The
    /// returned locations point past each site's current contents.
    pub fn available_pos(&self, bug: &mut Bug) -> Vec<ThreadPointer> {
        if self.current >= self.trace.len() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for tid in 0..self.trace.num_threads {
            if self.used_tids.contains(&tid) {
                continue;
            }
            let Some(pos) = self.eligible_pos(tid) else {
                continue;
            };
            if pos.line_loc != LineLoc::Before {
                continue;
            }
            let fl = pos.file_line.clone().expect("eligible position has a line");
            let location = bug.ensure_site(&fl).exloc_current();
            out.push(ThreadPointer::new(tid, Some(location)));
        }
        out
    }

    /// Like [`available_pos`](Self::available_pos) but peeking at an
    /// arbitrary index without touching the site table. The used set only
    /// applies when peeking at the cursor itself.
    pub fn available_pos_at(&self, index: usize) -> Vec<(usize, FileLine)> {
        if index >= self.trace.len() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for tid in 0..self.trace.num_threads {
            if index == self.current && self.used_tids.contains(&tid) {
                continue;
            }
            let pos = self.trace.thread_pos(tid, index);
            let Some(fl) = &pos.file_line else {
                continue;
            };
            if pos.line_loc != LineLoc::Before || !self.filter.allows(fl) {
                continue;
            }
            out.push((pos.tid, fl.clone()));
        }
        out
    }

    pub fn mark_use(&mut self, tid: usize) {
        self.used_tids.insert(tid);
    }

    /// Uniformly pick an injectable position and mark its thread used.
    pub fn get_one_pos<R: Rng>(
        &mut self,
        bug: &mut Bug,
        rng: &mut R,
    ) -> Result<ThreadPointer, BugError> {
        let positions = self.available_pos(bug);
        let chosen = positions
            .choose(rng)
            .cloned()
            .ok_or(BugError::NoPosition)?;
        self.mark_use(chosen.tid);
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_trace::parse_log;
    use std::collections::HashMap;

    fn trace(log: &str) -> Trace {
        Trace::new(parse_log(log), HashMap::new()).unwrap()
    }

    #[test]
    fn move_appends_crossed_events_to_the_schedule() {
        let trace = trace("0 = a.c:1\n1 = a.c:2\n0 > a.c:3\n0 = None\n");
        let filter = LineFilter::allow_all(&trace);
        let mut walker = TraceWalker::new(&trace, &filter);
        let mut bug = Bug::new(0, "input-0");

        walker.move_to(4, &mut bug);
        assert_eq!(bug.order.len(), 4);
        // before events land at the site start
        assert_eq!(
            bug.order.get(0).location.as_ref().unwrap().code_ptr,
            Some(0)
        );
        // middle events defer to the site's final length
        assert_eq!(bug.order.get(2).location.as_ref().unwrap().code_ptr, None);
        assert_eq!(bug.order.get(2).line_loc, LineLoc::Middle);
        // unknown positions stay location-less
        assert!(bug.order.get(3).location.is_none());
    }

    #[test]
    fn available_positions_require_before_events_on_eligible_lines() {
        let trace = trace("0 = a.c:1\n1 - a.c:2\n");
        let filter = LineFilter::allow_all(&trace);
        let mut walker = TraceWalker::new(&trace, &filter);
        let mut bug = Bug::new(0, "input-0");
        walker.move_to(2, &mut bug);

        let avail = walker.available_pos(&mut bug);
        assert_eq!(avail.len(), 1);
        assert_eq!(avail[0].tid, 0);
    }

    #[test]
    fn used_threads_are_hidden_until_the_cursor_moves() {
        let trace = trace("0 = a.c:1\n1 = a.c:2\n0 = a.c:3\n");
        let filter = LineFilter::allow_all(&trace);
        let mut walker = TraceWalker::new(&trace, &filter);
        let mut bug = Bug::new(0, "input-0");
        walker.move_to(2, &mut bug);

        walker.mark_use(0);
        assert_eq!(walker.available_pos(&mut bug).len(), 1);
        // peeking past the cursor ignores the used set; at the cursor it holds
        assert_eq!(walker.available_pos_at(3).len(), 2);
        assert_eq!(walker.available_pos_at(walker.current).len(), 1);

        walker.move_to(3, &mut bug);
        assert_eq!(walker.available_pos(&mut bug).len(), 2);
    }

    #[test]
    fn filter_excludes_trace_blacklisted_lines() {
        let log = "0 = a.c:1\n1 = a.c:2\n";
        let blacklist = core_trace::parse_blacklist("a.c: [2]\n").unwrap();
        let trace = Trace::new(parse_log(log), blacklist).unwrap();
        let filter = LineFilter::allow_all(&trace);
        assert!(filter.allows(&FileLine::new("a.c", 1)));
        assert!(!filter.allows(&FileLine::new("a.c", 2)));
    }

    #[test]
    fn get_one_pos_fails_when_nothing_is_available() {
        let trace = trace("0 = None\n");
        let filter = LineFilter::allow_all(&trace);
        let mut walker = TraceWalker::new(&trace, &filter);
        let mut bug = Bug::new(0, "input-0");
        walker.move_to(1, &mut bug);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        assert_eq!(
            walker.get_one_pos(&mut bug, &mut rng).unwrap_err(),
            BugError::NoPosition
        );
    }
}
