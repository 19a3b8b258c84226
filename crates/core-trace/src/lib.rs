//! Recorded execution traces: log parsing, blacklists, and snapshot lookup.
//!
//! A trace is a total order of thread-line events recorded by an external
//! tracer. Besides plain indexing it answers "where was thread T as of event
//! index I" in O(1), which is what the walker leans on to enumerate injectable
//! positions at any cursor.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail, ensure};
use regex::Regex;

use core_model::{FileLine, LineLoc};

/// One recorded event: thread `tid` observed at `file_line` (absent when the
/// thread stepped outside traced code).
#[derive(Debug, Clone)]
pub struct ThreadPos {
    pub tid: usize,
    pub line_loc: LineLoc,
    pub file_line: Option<FileLine>,
}

static LOG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+) ([=>-]) (None|(.*):(\d+))\s*$").expect("static regex"));

/// Parse a single trace-log line; `None` for lines that are not events.
pub fn parse_log_line(line: &str) -> Option<ThreadPos> {
    let caps = LOG_LINE.captures(line)?;
    let tid: usize = caps[1].parse().ok()?;
    let line_loc = LineLoc::from_sign(caps[2].chars().next()?)?;
    let file_line = if &caps[3] == "None" {
        None
    } else {
        let line: usize = caps[5].parse().ok()?;
        Some(FileLine::new(&caps[4], line))
    };
    Some(ThreadPos {
        tid,
        line_loc,
        file_line,
    })
}

/// Parse a whole log, skipping non-event lines.
pub fn parse_log(text: &str) -> Vec<ThreadPos> {
    text.lines().filter_map(parse_log_line).collect()
}

/// Parse a blacklist file: `<filename>: [<line>, <line>, …]` per line.
pub fn parse_blacklist(text: &str) -> Result<HashMap<String, HashSet<usize>>> {
    let mut out: HashMap<String, HashSet<usize>> = HashMap::new();
    for line in text.lines() {
        let Some(colon) = line.find(':') else {
            continue;
        };
        let filename = line[..colon].trim().to_owned();
        let rest = line[colon + 1..].trim();
        let Some(body) = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
        else {
            bail!("malformed blacklist entry: {line}");
        };
        let entry = out.entry(filename).or_default();
        for item in body.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let lineno: usize = item
                .parse()
                .with_context(|| format!("malformed blacklist line number: {item}"))?;
            entry.insert(lineno);
        }
    }
    Ok(out)
}

/// Immutable, snapshot-indexable trace. Index 0 is a synthetic sentinel with
/// no position so `thread_pos` is total over `0..len()`.
#[derive(Debug)]
pub struct Trace {
    pos_table: Vec<ThreadPos>,
    pos_index: Vec<Vec<usize>>,
    pub num_threads: usize,
    blacklist: HashMap<String, HashSet<usize>>,
}

impl Trace {
    pub fn new(
        positions: Vec<ThreadPos>,
        blacklist: HashMap<String, HashSet<usize>>,
    ) -> Result<Self> {
        ensure!(!positions.is_empty(), "trace contains no events");
        let tmax = positions.iter().map(|p| p.tid).max().unwrap_or(0);
        let num_threads = tmax + 1;

        let sentinel = ThreadPos {
            tid: 0,
            line_loc: LineLoc::After,
            file_line: None,
        };
        let mut pos_table = Vec::with_capacity(positions.len() + 1);
        pos_table.push(sentinel);
        let mut pos_index = Vec::with_capacity(positions.len() + 1);
        pos_index.push(vec![0; num_threads]);
        for pos in positions {
            let idx = pos_table.len();
            let tid = pos.tid;
            pos_table.push(pos);
            let mut cur = pos_index
                .last()
                .expect("snapshot table starts non-empty")
                .clone();
            cur[tid] = idx;
            pos_index.push(cur);
        }
        Ok(Self {
            pos_table,
            pos_index,
            num_threads,
            blacklist,
        })
    }

    pub fn from_files(log_path: &Path, blacklist_path: Option<&Path>) -> Result<Self> {
        let log = fs::read_to_string(log_path)
            .with_context(|| format!("reading trace log {}", log_path.display()))?;
        let blacklist = match blacklist_path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading blacklist {}", path.display()))?;
                parse_blacklist(&text)?
            }
            None => HashMap::new(),
        };
        Self::new(parse_log(&log), blacklist)
    }

    /// Number of events, sentinel included.
    pub fn len(&self) -> usize {
        self.pos_table.len()
    }

    pub fn is_empty(&self) -> bool {
        // the sentinel is always present
        self.pos_table.len() <= 1
    }

    pub fn get(&self, index: usize) -> &ThreadPos {
        &self.pos_table[index]
    }

    /// Last event of `tid` at or before `index`; the sentinel when the
    /// thread has not appeared yet.
    pub fn thread_pos(&self, tid: usize, index: usize) -> &ThreadPos {
        &self.pos_table[self.pos_index[index][tid]]
    }

    pub fn in_blacklist(&self, file_line: &FileLine) -> bool {
        self.blacklist
            .get(&file_line.filename)
            .is_some_and(|lines| lines.contains(&file_line.line))
    }

    /// Every distinct file-line appearing in the trace, in first-seen order.
    pub fn distinct_file_lines(&self) -> Vec<FileLine> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pos in &self.pos_table {
            if let Some(fl) = &pos.file_line {
                if seen.insert(fl.clone()) {
                    out.push(fl.clone());
                }
            }
        }
        out
    }
}
