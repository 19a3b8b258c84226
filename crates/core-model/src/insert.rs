//! Insertion points: rendered code blocks waiting to be merged into a file.

use crate::{FileLine, LineLoc};

/// Where an insertion attaches: a file-line plus the within-line position.
/// Injected code always uses `Before`; the commit pass represents original
/// source lines as `Middle` so they sort after the insertions at their line.
#[derive(Debug, Clone)]
pub struct InjectLocation {
    pub file_line: FileLine,
    pub line_loc: LineLoc,
}

impl InjectLocation {
    pub fn new(file_line: FileLine, line_loc: LineLoc) -> Self {
        Self {
            file_line,
            line_loc,
        }
    }
}

/// One block of rendered lines targeted at an [`InjectLocation`], plus the
/// absolute line numbers each rendered line (and the position just past the
/// block) received after commit.
#[derive(Debug, Clone)]
pub struct InsertionPoint {
    pub loc: InjectLocation,
    codes: Vec<String>,
    result_lines: Vec<usize>,
}

impl InsertionPoint {
    pub fn new(loc: InjectLocation, codes: Vec<String>) -> Self {
        let result_lines = vec![0; codes.len() + 1];
        Self {
            loc,
            codes,
            result_lines,
        }
    }

    pub fn code(&self, index: usize) -> &str {
        &self.codes[index]
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn code_len(&self) -> usize {
        self.codes.len()
    }

    pub fn set_result_line(&mut self, index: usize, line: usize) {
        self.result_lines[index] = line;
    }

    /// `index == code_len()` addresses the line just past the block.
    pub fn result_line(&self, index: usize) -> usize {
        self.result_lines[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_table_has_one_past_the_end_slot() {
        let loc = InjectLocation::new(FileLine::new("a.c", 1), LineLoc::Before);
        let mut p = InsertionPoint::new(loc, vec!["x;".into(), "y;".into()]);
        p.set_result_line(2, 7);
        assert_eq!(p.code_len(), 2);
        assert_eq!(p.result_line(2), 7);
    }
}
