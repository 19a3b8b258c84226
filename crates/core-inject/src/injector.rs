//! Line-merge injector: accumulates insertion points per file, commits them
//! by rewriting each file once, and resolves post-commit line numbers.
//!
//! Files are handled as raw bytes; only line boundaries are interpreted.
//! Line endings are normalized to `\n` on commit.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use tracing::info;

use core_model::{FileLine, InjectLocation, InsertionPoint, LineLoc, PointHandle};

enum MergeEntry {
    /// Index into the file's insertion-point list.
    Point(usize),
    /// One original source line, already stripped of its line ending.
    Original(Vec<u8>),
}

/// Accumulates insertion points keyed by target file. `commit` rewrites the
/// files and fills every point's result-line table; handles stay resolvable
/// afterwards.
#[derive(Debug, Default)]
pub struct Injector {
    ops: IndexMap<String, Vec<InsertionPoint>>,
    committed: bool,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `codes` for insertion at `loc` and return a resolvable handle.
    pub fn add(&mut self, loc: InjectLocation, codes: Vec<String>) -> PointHandle {
        assert!(!self.committed, "insertion added after commit");
        let file = loc.file_line.filename.clone();
        let points = self.ops.entry(file.clone()).or_default();
        points.push(InsertionPoint::new(loc, codes));
        PointHandle {
            file,
            index: points.len() - 1,
        }
    }

    /// Merge every file's insertions with its original lines, preserving the
    /// indentation of each target line, renumber, and write the files back.
    pub fn commit(&mut self) -> Result<()> {
        ensure!(!self.committed, "injector committed twice");
        self.committed = true;

        for (filename, points) in self.ops.iter_mut() {
            let raw = fs::read(Path::new(filename))
                .with_context(|| format!("reading injection target {filename}"))?;
            let raw_lines: Vec<&[u8]> = raw.split_inclusive(|&b| b == b'\n').collect();

            // insertion points first, original lines second: the stable sort
            // keeps same-line points in add order and sorts them before the
            // line itself ('=' < '>')
            let mut entries: Vec<(usize, u8, MergeEntry)> = Vec::new();
            for (index, point) in points.iter().enumerate() {
                entries.push((
                    point.loc.file_line.line,
                    point.loc.line_loc.sign() as u8,
                    MergeEntry::Point(index),
                ));
            }
            for (lineno0, line) in raw_lines.iter().enumerate() {
                let stripped = strip_eol(line).to_vec();
                entries.push((
                    lineno0 + 1,
                    LineLoc::Middle.sign() as u8,
                    MergeEntry::Original(stripped),
                ));
            }
            entries.sort_by_key(|(line, sign, _)| (*line, *sign));

            let mut out: Vec<Vec<u8>> = Vec::new();
            let mut last_lineno = usize::MAX;
            let mut indent: Vec<u8> = Vec::new();
            for (lineno, _sign, entry) in entries {
                if lineno != last_lineno {
                    last_lineno = lineno;
                    indent = if lineno >= 1 {
                        raw_lines
                            .get(lineno - 1)
                            .map(|l| indent_of(l))
                            .unwrap_or_default()
                    } else {
                        Vec::new()
                    };
                }
                match entry {
                    MergeEntry::Original(line) => out.push(line),
                    MergeEntry::Point(index) => {
                        let point = &mut points[index];
                        for k in 0..point.code_len() {
                            let mut line = indent.clone();
                            line.extend_from_slice(point.code(k).as_bytes());
                            point.set_result_line(k, out.len() + 1);
                            out.push(line);
                        }
                        point.set_result_line(point.code_len(), out.len() + 1);
                    }
                }
            }

            let written = out.join(&b'\n');
            fs::write(Path::new(filename), &written)
                .with_context(|| format!("writing injected file {filename}"))?;
            info!(
                target: "inject",
                file = filename.as_str(),
                points = points.len(),
                lines = out.len(),
                "file_committed"
            );
        }
        Ok(())
    }

    fn point(&self, handle: &PointHandle) -> &InsertionPoint {
        &self.ops[&handle.file][handle.index]
    }

    /// Absolute line of code line `index` of the handle's block;
    /// `index == code_len` addresses the line just past the block.
    pub fn result_line(&self, handle: &PointHandle, index: usize) -> usize {
        self.point(handle).result_line(index)
    }

    pub fn point_code_len(&self, handle: &PointHandle) -> usize {
        self.point(handle).code_len()
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn indent_of(line: &[u8]) -> Vec<u8> {
    let end = line
        .iter()
        .position(|&b| !(b == b' ' || b == b'\t'))
        .unwrap_or(line.len());
    line[..end].to_vec()
}

/// Registry of every insertion point per absolute file-line, across bugs.
/// Resolves "past the end of everything injected here" — the post-commit
/// position of the original line itself.
#[derive(Debug, Default)]
pub struct InsertionSet {
    points: std::collections::HashMap<FileLine, Vec<PointHandle>>,
}

impl InsertionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, file_line: FileLine, handle: PointHandle) {
        self.points.entry(file_line).or_default().push(handle);
    }

    /// Resolve a site-relative piece index to an absolute line. `None`
    /// resolves past the last insertion block at the file-line.
    pub fn resolve(
        &self,
        injector: &Injector,
        file_line: &FileLine,
        own: &PointHandle,
        index: Option<usize>,
    ) -> usize {
        match index {
            Some(i) => injector.result_line(own, i),
            None => {
                let handles = self
                    .points
                    .get(file_line)
                    .unwrap_or_else(|| panic!("no insertion registered at {file_line}"));
                let last = handles.last().expect("registered lists are non-empty");
                injector.result_line(last, injector.point_code_len(last))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn loc(file: &str, line: usize) -> InjectLocation {
        InjectLocation::new(FileLine::new(file, line), LineLoc::Before)
    }

    #[test]
    fn commit_merges_preserving_indentation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.c");
        fs::write(&path, "int a;\n    b = 1;\nc = 2;\n").unwrap();
        let file = path.to_str().unwrap();

        let mut injector = Injector::new();
        let top = injector.add(loc(file, 0), vec!["#include \"racebench_bugs.h\"".into()]);
        let mid = injector.add(loc(file, 2), vec!["x();".into(), "y();".into()]);
        injector.commit().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "#include \"racebench_bugs.h\"\nint a;\n    x();\n    y();\n    b = 1;\nc = 2;"
        );
        assert_eq!(injector.result_line(&top, 0), 1);
        assert_eq!(injector.result_line(&mid, 0), 3);
        assert_eq!(injector.result_line(&mid, 1), 4);
        // one past the block = the original line's new position
        assert_eq!(injector.result_line(&mid, 2), 5);
    }

    #[test]
    fn multiple_points_at_one_line_keep_add_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.c");
        fs::write(&path, "a;\nb;\n").unwrap();
        let file = path.to_str().unwrap();

        let mut injector = Injector::new();
        let first = injector.add(loc(file, 2), vec!["first();".into()]);
        let second = injector.add(loc(file, 2), vec!["second();".into()]);
        injector.commit().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "a;\nfirst();\nsecond();\nb;");
        assert!(injector.result_line(&first, 0) < injector.result_line(&second, 0));
    }

    #[test]
    fn insertion_set_resolves_past_the_last_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.c");
        fs::write(&path, "a;\nb;\n").unwrap();
        let file = path.to_str().unwrap();

        let mut injector = Injector::new();
        let mut set = InsertionSet::new();
        let fl = FileLine::new(file, 1);
        let h1 = injector.add(loc(file, 1), vec!["p();".into()]);
        set.register(fl.clone(), h1.clone());
        let h2 = injector.add(loc(file, 1), vec!["q();".into()]);
        set.register(fl.clone(), h2);
        injector.commit().unwrap();

        // "a;" moved to line 3, after both injected lines
        assert_eq!(set.resolve(&injector, &fl, &h1, None), 3);
        assert_eq!(set.resolve(&injector, &fl, &h1, Some(0)), 1);
    }

    #[test]
    fn crlf_endings_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.c");
        fs::write(&path, "a;\r\nb;\r\n").unwrap();
        let file = path.to_str().unwrap();

        let mut injector = Injector::new();
        injector.add(loc(file, 2), vec!["x();".into()]);
        injector.commit().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a;\nx();\nb;");
    }

    #[test]
    fn double_commit_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.c");
        fs::write(&path, "a;\n").unwrap();
        let mut injector = Injector::new();
        injector.add(loc(path.to_str().unwrap(), 1), vec!["x();".into()]);
        injector.commit().unwrap();
        assert!(injector.commit().is_err());
    }
}
