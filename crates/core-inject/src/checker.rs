//! Syntactic eligibility of a source line as an injection target.
//!
//! Injection happens *before* a line, so the line itself must be an ordinary
//! statement: no braces, no jumps, no labels, no preprocessor directives.
//! Header files are off limits entirely — injected state is per translation
//! unit.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(case)?\s*\w+:").expect("static regex"));
static JUMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(break|continue|goto|return|longjmp)\b").expect("static regex"));

const BAD_EXTENSIONS: [&str; 3] = ["h", "hpp", "hxx"];

/// Per-file line classification with a cache keyed by path. The blacklist
/// holds basenames that must never receive injections.
#[derive(Debug, Default)]
pub struct InjectChecker {
    blacklist: HashSet<String>,
    line_cache: HashMap<PathBuf, Vec<bool>>,
}

impl InjectChecker {
    pub fn new<I, S>(blacklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blacklist: blacklist.into_iter().map(Into::into).collect(),
            line_cache: HashMap::new(),
        }
    }

    /// Whether code may be inserted before `line` (1-based) of `filename`.
    /// Line 0 (prepend at top) and lines past the end are always allowed.
    pub fn can_insert_before(&mut self, filename: &Path, line: usize) -> Result<bool> {
        if let Some(ext) = filename.extension().and_then(|e| e.to_str()) {
            if BAD_EXTENSIONS.contains(&ext) {
                return Ok(false);
            }
        }
        if let Some(base) = filename.file_name().and_then(|b| b.to_str()) {
            if self.blacklist.contains(base) {
                return Ok(false);
            }
        }
        let cache = self.lines(filename)?;
        Ok(line == 0 || line > cache.len() || cache[line - 1])
    }

    fn lines(&mut self, filename: &Path) -> Result<&Vec<bool>> {
        if !self.line_cache.contains_key(filename) {
            let raw = fs::read(filename)
                .with_context(|| format!("reading source file {}", filename.display()))?;
            let classified = raw
                .split_inclusive(|&b| b == b'\n')
                .map(|line| Self::is_good_line(&String::from_utf8_lossy(line)))
                .collect();
            self.line_cache.insert(filename.to_path_buf(), classified);
        }
        Ok(&self.line_cache[filename])
    }

    pub fn is_good_line(line: &str) -> bool {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.contains('{') || line.contains('}') {
            return false;
        }
        if LABEL.is_match(line) {
            return false;
        }
        if JUMP.is_match(line) {
            return false;
        }
        if line.trim_start().starts_with('#') {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn statement_lines_are_good() {
        assert!(InjectChecker::is_good_line("x = y + 1;\n"));
        assert!(InjectChecker::is_good_line("    foo(a, b);"));
        assert!(InjectChecker::is_good_line(""));
    }

    #[test]
    fn braces_jumps_labels_and_directives_are_bad() {
        assert!(!InjectChecker::is_good_line("if (x) {"));
        assert!(!InjectChecker::is_good_line("}"));
        assert!(!InjectChecker::is_good_line("    return 0;"));
        assert!(!InjectChecker::is_good_line("break;"));
        assert!(!InjectChecker::is_good_line("goto out;"));
        assert!(!InjectChecker::is_good_line("longjmp(env, 1);"));
        assert!(!InjectChecker::is_good_line("case 3:"));
        assert!(!InjectChecker::is_good_line("retry:"));
        assert!(!InjectChecker::is_good_line("#include <stdio.h>"));
        assert!(!InjectChecker::is_good_line("  #define X 1"));
    }

    #[test]
    fn headers_and_blacklisted_basenames_are_rejected() {
        let mut checker = InjectChecker::new(["skip.c".to_owned()]);
        assert!(!checker.can_insert_before(Path::new("a.h"), 0).unwrap());
        assert!(!checker.can_insert_before(Path::new("a.hpp"), 0).unwrap());
        assert!(
            !checker
                .can_insert_before(Path::new("dir/skip.c"), 0)
                .unwrap()
        );
    }

    #[test]
    fn file_lines_are_classified_and_cached() {
        let mut tmp = tempfile::NamedTempFile::with_suffix(".c").unwrap();
        write!(tmp, "int x;\nif (x) {{\n    x = 1;\n}}\n").unwrap();
        let mut checker = InjectChecker::new(Vec::<String>::new());
        let path = tmp.path();
        assert!(checker.can_insert_before(path, 0).unwrap());
        assert!(checker.can_insert_before(path, 1).unwrap());
        assert!(!checker.can_insert_before(path, 2).unwrap());
        assert!(checker.can_insert_before(path, 3).unwrap());
        assert!(!checker.can_insert_before(path, 4).unwrap());
        // beyond the end counts as the prepend position of nothing
        assert!(checker.can_insert_before(path, 99).unwrap());
    }
}
