//! Dominator oracle: which source lines pre-/post-dominate a given line.
//!
//! The production oracle is an external executable queried per (file, line,
//! mode); its stdout is a whitespace-separated list of line numbers. Tests
//! and degraded runs substitute their own [`DomOracle`] implementations.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, ensure};
use tracing::debug;

/// Dominance relation requested for a second injection site relative to a
/// first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomMode {
    Any,
    PreOnly,
    PostOnly,
    Both,
}

impl DomMode {
    /// Wire encoding of the oracle's `--mode` argument.
    pub fn mode_arg(self) -> u8 {
        match self {
            DomMode::Any => 0,
            DomMode::PreOnly => 1,
            DomMode::PostOnly => 2,
            DomMode::Both => 3,
        }
    }
}

pub trait DomOracle {
    /// Lines of `file` in the requested dominance relation to `line`, within
    /// the same function.
    fn query(&mut self, file: &str, line: usize, mode: DomMode) -> Result<Vec<usize>>;
}

/// Sub-process client for the external dominance analyzer.
#[derive(Debug)]
pub struct SubprocessDom {
    exe: PathBuf,
    build_path: PathBuf,
}

impl SubprocessDom {
    pub fn new(exe: impl Into<PathBuf>, build_path: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            build_path: build_path.into(),
        }
    }
}

impl DomOracle for SubprocessDom {
    fn query(&mut self, file: &str, line: usize, mode: DomMode) -> Result<Vec<usize>> {
        let source = self.build_path.join(file);
        let output = Command::new(&self.exe)
            .arg("-p")
            .arg(&self.build_path)
            .arg("--source")
            .arg(&source)
            .arg("--line")
            .arg(line.to_string())
            .arg("--mode")
            .arg(mode.mode_arg().to_string())
            .output()
            .with_context(|| format!("spawning dominator oracle {}", self.exe.display()))?;
        ensure!(
            output.status.success(),
            "dominator oracle failed with {} on {}:{}",
            output.status,
            file,
            line
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines = stdout
            .split_whitespace()
            .map(|tok| {
                tok.parse::<usize>()
                    .with_context(|| format!("malformed oracle output token: {tok}"))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            target: "dom",
            file,
            line,
            mode = mode.mode_arg(),
            hits = lines.len(),
            "oracle_query"
        );
        Ok(lines)
    }
}

/// Oracle used when no analyzer executable is configured: reports no
/// dominating lines, so patterns always fall back to single-site layouts.
#[derive(Debug, Default)]
pub struct NullDom;

impl DomOracle for NullDom {
    fn query(&mut self, _file: &str, _line: usize, _mode: DomMode) -> Result<Vec<usize>> {
        Ok(Vec::new())
    }
}
