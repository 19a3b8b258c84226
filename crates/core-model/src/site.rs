//! Injection sites: the per-(file, line) accumulators of lazy pieces.

use core_ir::LazyPiece;

use crate::{FileLine, SiteLocation};

/// Handle to one insertion point registered with the injector: the file key
/// and the point's index within that file's insertion list. Resolving a
/// handle after commit yields absolute line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointHandle {
    pub file: String,
    pub index: usize,
}

/// Ordered pieces queued for insertion before one source line. Non-empty
/// sites always start with `IfdefBug` and, once sealed, end with `IfdefEnd`.
#[derive(Debug, Clone)]
pub struct CodeSite {
    pub file_line: FileLine,
    codes: Vec<LazyPiece>,
    /// Set by the injection planner once the site's insertion point exists.
    pub point: Option<PointHandle>,
}

impl CodeSite {
    pub fn new(file_line: FileLine) -> Self {
        Self {
            file_line,
            codes: Vec::new(),
            point: None,
        }
    }

    /// Appends a piece and returns its index within the site.
    pub fn append(&mut self, piece: LazyPiece) -> usize {
        self.codes.push(piece);
        self.codes.len() - 1
    }

    pub fn codes(&self) -> &[LazyPiece] {
        &self.codes
    }

    pub fn codes_mut(&mut self) -> &mut [LazyPiece] {
        &mut self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Execution location at the top of the site.
    pub fn exloc_start(&self) -> SiteLocation {
        SiteLocation::new(self.file_line.clone(), Some(0))
    }

    /// Execution location standing for "wherever the site ends up ending".
    pub fn exloc_middle(&self) -> SiteLocation {
        SiteLocation::new(self.file_line.clone(), None)
    }

    /// Execution location just past the pieces appended so far.
    pub fn exloc_current(&self) -> SiteLocation {
        SiteLocation::new(self.file_line.clone(), Some(self.codes.len()))
    }
}
