//! Structured per-bug build log, dumped as `bug-<id>.json`.

use serde::Serialize;

use core_model::FileLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssumeOutcome {
    Crash,
    Chain,
    Nest,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PatternLocation {
    pub thread: usize,
    pub file: String,
    pub line: usize,
}

/// One log record. The `type` tag and field names are part of the artifact
/// format consumed by downstream evaluation tooling.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogItem {
    Next {
        thread: usize,
        file: String,
        line: usize,
    },
    Pattern {
        name: String,
        locations: Vec<PatternLocation>,
    },
    Assume {
        outcome: AssumeOutcome,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BugLog {
    items: Vec<LogItem>,
}

impl BugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&mut self, thread: usize, file_line: &FileLine) {
        self.items.push(LogItem::Next {
            thread,
            file: file_line.filename.clone(),
            line: file_line.line,
        });
    }

    pub fn add_pattern(&mut self, name: &str, locations: Vec<(usize, FileLine)>) {
        let locations = locations
            .into_iter()
            .map(|(thread, fl)| PatternLocation {
                thread,
                file: fl.filename,
                line: fl.line,
            })
            .collect();
        self.items.push(LogItem::Pattern {
            name: name.to_owned(),
            locations,
        });
    }

    pub fn add_assume(&mut self, outcome: AssumeOutcome) {
        self.items.push(LogItem::Assume { outcome });
    }

    pub fn items(&self) -> &[LogItem] {
        &self.items
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.items).expect("log items serialize infallibly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_matches_the_artifact_format() {
        let mut log = BugLog::new();
        log.add_location(1, &FileLine::new("a.c", 3));
        log.add_pattern("WWA", vec![(0, FileLine::new("a.c", 3))]);
        log.add_assume(AssumeOutcome::Crash);
        let json: serde_json::Value = serde_json::from_str(&log.to_json()).unwrap();
        assert_eq!(json[0]["type"], "next");
        assert_eq!(json[0]["thread"], 1);
        assert_eq!(json[0]["file"], "a.c");
        assert_eq!(json[0]["line"], 3);
        assert_eq!(json[1]["type"], "pattern");
        assert_eq!(json[1]["name"], "WWA");
        assert_eq!(json[1]["locations"][0]["thread"], 0);
        assert_eq!(json[2]["type"], "assume");
        assert_eq!(json[2]["outcome"], "Crash");
    }
}
