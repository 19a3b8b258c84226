//! One synthesized bug: its injection sites, interleave schedule, structured
//! log, and state variables — plus the machinery that builds it from a trace.

pub mod extract;
pub mod log;
pub mod placement;
pub mod plan;
pub mod runner;
pub mod walker;

pub use extract::{BugExtractor, ExtractOptions, ExtractState};
pub use log::{AssumeOutcome, BugLog, LogItem};
pub use walker::{LineFilter, TraceWalker};

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;

use core_codegen::Variable;
use core_ir::{LazyPiece, Reserved, State};
use core_model::{CodeSite, FileLine, Interleave, ThreadPointer};

/// A bug under construction or accepted. Sites are keyed by file-line and
/// iterate in creation order.
#[derive(Debug)]
pub struct Bug {
    pub bug_id: u32,
    pub input_file: PathBuf,
    sites: IndexMap<FileLine, CodeSite>,
    pub log: BugLog,
    pub order: Interleave,
    all_vars: Vec<Variable>,
}

impl Bug {
    pub fn new(bug_id: u32, input_file: impl Into<PathBuf>) -> Self {
        Self {
            bug_id,
            input_file: input_file.into(),
            sites: IndexMap::new(),
            log: BugLog::new(),
            order: Interleave::new(),
            all_vars: Vec::new(),
        }
    }

    pub fn site(&self, loc: &FileLine) -> Option<&CodeSite> {
        self.sites.get(loc)
    }

    pub fn site_mut(&mut self, loc: &FileLine) -> Option<&mut CodeSite> {
        self.sites.get_mut(loc)
    }

    /// Site at `loc`, created empty on first touch.
    pub fn ensure_site(&mut self, loc: &FileLine) -> &mut CodeSite {
        self.sites
            .entry(loc.clone())
            .or_insert_with(|| CodeSite::new(loc.clone()))
    }

    /// Pieces queued at `loc`; empty for untouched lines.
    pub fn site_codes(&self, loc: &FileLine) -> &[LazyPiece] {
        self.sites.get(loc).map(|s| s.codes()).unwrap_or(&[])
    }

    pub fn site_len(&self, loc: &FileLine) -> usize {
        self.sites.get(loc).map(|s| s.len()).unwrap_or(0)
    }

    /// Append a reserved piece at `loc`, opening the ifdef fence on first
    /// use. Returns the piece's index within the site.
    pub fn append_code(&mut self, loc: &FileLine, code: Reserved) -> usize {
        let bug_id = self.bug_id;
        let site = self.ensure_site(loc);
        if site.is_empty() {
            site.append(LazyPiece::new(Reserved::IfdefBug(bug_id)));
        }
        site.append(LazyPiece::new(code))
    }

    pub fn set_after_order(&mut self, loc: &FileLine, code_index: usize, after_order: usize) {
        let site = self
            .site_mut(loc)
            .unwrap_or_else(|| panic!("no site at {loc}"));
        site.codes_mut()[code_index].after_order = after_order;
    }

    /// Seal every non-empty site with a pre-materialized `IfdefEnd`.
    pub fn append_ifdef_end(&mut self) {
        for site in self.sites.values_mut() {
            if site.is_empty() {
                continue;
            }
            let mut lazy = LazyPiece::new(Reserved::IfdefEnd);
            lazy.materialize(&State::new());
            site.append(lazy);
        }
    }

    pub fn append_order(&mut self, entry: ThreadPointer) -> usize {
        self.order.push(entry)
    }

    pub fn add_vars(&mut self, vars: Vec<Variable>) {
        self.all_vars.extend(vars);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.all_vars
    }

    pub fn iter_sites(&self) -> impl Iterator<Item = (&FileLine, &CodeSite)> {
        self.sites.iter()
    }

    pub fn iter_sites_mut(&mut self) -> impl Iterator<Item = (&FileLine, &mut CodeSite)> {
        self.sites.iter_mut()
    }

    /// Filenames hosting at least one site, in first-touch order.
    pub fn all_files(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for loc in self.sites.keys() {
            if seen.insert(loc.filename.as_str()) {
                out.push(loc.filename.clone());
            }
        }
        out
    }

    /// Fill `new_line` on every located schedule entry. The resolver maps a
    /// site plus an optional piece index to an absolute post-commit line.
    pub fn resolve_order_lines<F>(&mut self, resolver: F)
    where
        F: Fn(&CodeSite, Option<usize>) -> usize,
    {
        let sites = &self.sites;
        for entry in self.order.iter_mut() {
            let Some(loc) = &mut entry.location else {
                continue;
            };
            let site = sites
                .get(&loc.file_line)
                .unwrap_or_else(|| panic!("schedule references missing site {}", loc.file_line));
            loc.new_line = Some(resolver(site, loc.code_ptr));
        }
    }

    /// The order file: one resolved schedule entry per line.
    pub fn dump_order(&self) -> String {
        let mut out = String::new();
        for entry in self.order.iter() {
            out.push_str(&entry.render_resolved());
            out.push('\n');
        }
        out
    }

    /// Relative artifact names for bug `id`.
    pub fn log_file_name(&self) -> String {
        format!("bug-{}.json", self.bug_id)
    }

    pub fn input_file_name(&self) -> String {
        format!("input-{}", self.bug_id)
    }

    pub fn order_file_name(&self) -> String {
        format!("order-{}.txt", self.bug_id)
    }

    pub fn answer_file_name(&self) -> String {
        format!("answer-{}.txt", self.bug_id)
    }
}
