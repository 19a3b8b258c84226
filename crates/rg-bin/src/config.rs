//! Run configuration: a small JSON file naming how many bugs to build and
//! how they are shaped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_input_arg() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Mutation steps applied to the input seed per bug.
    pub mutate_num: usize,
    /// Length of the pre-bug define-use path.
    pub path_len: usize,
    /// Number of bugs to synthesize.
    pub bug_num: usize,
    /// argv index the injected runtime reads the input file from.
    #[serde(default = "default_input_arg")]
    pub input_arg: usize,
}

pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_required_fields_and_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{{\"mutate_num\": 3, \"path_len\": 5, \"bug_num\": 2}}").unwrap();
        let cfg = load_from(tmp.path()).unwrap();
        assert_eq!(cfg.mutate_num, 3);
        assert_eq!(cfg.path_len, 5);
        assert_eq!(cfg.bug_num, 2);
        assert_eq!(cfg.input_arg, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_from(Path::new("__nonexistent_config__.json")).is_err());
    }

    #[test]
    fn overridden_input_arg_is_kept() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            "{{\"mutate_num\": 1, \"path_len\": 1, \"bug_num\": 1, \"input_arg\": 3}}"
        )
        .unwrap();
        assert_eq!(load_from(tmp.path()).unwrap().input_arg, 3);
    }
}
