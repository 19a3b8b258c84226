#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset.

use std::collections::HashMap;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;

use core_bug::{Bug, LineFilter};
use core_dom::{DomMode, DomOracle};
use core_model::LineLoc;
use core_trace::{Trace, parse_log};

/// A 2-thread trace alternating `0 = src.c:1`, `1 = src.c:2`, … with one
/// unique line per event. Every event is a `Before` on an eligible line.
pub fn alternating_trace(events: usize) -> Trace {
    let mut log = String::new();
    for i in 0..events {
        let tid = i % 2;
        let line = i + 1;
        log.push_str(&format!("{tid} = src.c:{line}\n"));
    }
    Trace::new(parse_log(&log), HashMap::new()).unwrap()
}

/// Same shape, with a trace blacklist over the given lines of `src.c`.
pub fn alternating_trace_with_blacklist(events: usize, bad_lines: &[usize]) -> Trace {
    let mut log = String::new();
    for i in 0..events {
        let tid = i % 2;
        let line = i + 1;
        log.push_str(&format!("{tid} = src.c:{line}\n"));
    }
    let list = bad_lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let blacklist = core_trace::parse_blacklist(&format!("src.c: [{list}]\n")).unwrap();
    Trace::new(parse_log(&log), blacklist).unwrap()
}

/// Oracle that claims every line dominates every other line.
pub struct PermissiveDom;

impl DomOracle for PermissiveDom {
    fn query(&mut self, _file: &str, _line: usize, _mode: DomMode) -> Result<Vec<usize>> {
        Ok((1..=400).collect())
    }
}

/// Oracle recording its queries while delegating to a fixed answer.
#[derive(Default)]
pub struct RecordingDom {
    pub answer: Vec<usize>,
    pub queries: Vec<(String, usize, DomMode)>,
}

impl DomOracle for RecordingDom {
    fn query(&mut self, file: &str, line: usize, mode: DomMode) -> Result<Vec<usize>> {
        self.queries.push((file.to_owned(), line, mode));
        Ok(self.answer.clone())
    }
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn filter_all(trace: &Trace) -> LineFilter {
    LineFilter::allow_all(trace)
}

/// A stable textual digest of everything observable about a bug: rendered
/// site pieces, schedule entries, and the JSON log.
pub fn fingerprint(bug: &Bug) -> String {
    let mut out = String::new();
    for (loc, site) in bug.iter_sites() {
        out.push_str(&format!("site {loc}\n"));
        for lazy in site.codes() {
            let piece = lazy
                .piece
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "<lazy>".to_owned());
            out.push_str(&format!("  [{}] {piece}\n", lazy.after_order));
        }
    }
    for entry in bug.order.iter() {
        let loc = entry
            .location
            .as_ref()
            .map(|l| format!("{}@{:?}", l.file_line, l.code_ptr))
            .unwrap_or_else(|| "None".to_owned());
        out.push_str(&format!(
            "order {} {} {loc}\n",
            entry.tid,
            entry.line_loc.sign()
        ));
    }
    out.push_str(&bug.log.to_json());
    out
}

/// Asserts the §invariants every accepted bug must satisfy: ifdef fencing,
/// block balance, schedule causality, and site eligibility.
pub fn assert_bug_invariants(bug: &Bug, filter: &LineFilter) {
    use core_ir::Reserved;

    for (loc, site) in bug.iter_sites() {
        if site.is_empty() {
            continue;
        }
        let codes = site.codes();
        assert!(
            matches!(codes.first().unwrap().reserved, Reserved::IfdefBug(id) if id == bug.bug_id),
            "site {loc} does not open with its ifdef guard"
        );
        assert!(
            matches!(codes.last().unwrap().reserved, Reserved::IfdefEnd),
            "site {loc} does not close its ifdef guard"
        );

        let mut depth = 0i64;
        for lazy in codes {
            if lazy.reserved.is_if_cond() {
                depth += 1;
            }
            if lazy.reserved.is_block_end() {
                depth -= 1;
            }
            assert!(depth >= 0, "site {loc} closes a block it never opened");
        }
        assert_eq!(depth, 0, "site {loc} has unbalanced blocks");

        assert!(
            filter.allows(loc),
            "site {loc} was injected on an ineligible line"
        );
    }

    // schedule causality: an entry past piece k can only exist at or after
    // that piece's materialization barrier
    for (index, entry) in bug.order.iter().enumerate() {
        let Some(loc) = &entry.location else { continue };
        let Some(ptr) = loc.code_ptr else { continue };
        if entry.line_loc != LineLoc::Before || ptr == 0 {
            continue;
        }
        let codes = bug.site_codes(&loc.file_line);
        if let Some(lazy) = codes.get(ptr - 1) {
            assert!(
                lazy.after_order <= index,
                "entry {index} precedes its piece's barrier {}",
                lazy.after_order
            );
        }
    }
}
