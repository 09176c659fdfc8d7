//! Per-file trace artifacts for debugging match decisions
//!
//! When tracing is enabled, each processed file gets a JSON document under
//! `cache_dir/traces/<pass_id>/` recording the step it reached, the regex
//! captures or structured parse, and the outcome. Trace writes are best
//! effort and never fail a pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::services::text_utils::slugify;

#[derive(Debug, Clone, Serialize)]
pub struct FileTrace {
    pub filename: String,
    pub sport_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub groups: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

impl FileTrace {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            sport_id: None,
            status: "unprocessed".to_string(),
            reason: None,
            groups: HashMap::new(),
            pattern_id: None,
            destination: None,
        }
    }
}

pub struct TraceWriter {
    dir: Option<PathBuf>,
}

impl TraceWriter {
    /// `enabled = false` produces a writer that drops everything.
    pub fn new(cache_dir: &Path, pass_id: &str, enabled: bool) -> Self {
        Self {
            dir: enabled.then(|| cache_dir.join("traces").join(pass_id)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn persist(&self, trace: &FileTrace) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(err) = self.write(dir, trace) {
            warn!(filename = %trace.filename, error = %err, "Failed to persist trace artifact");
        }
    }

    fn write(&self, dir: &Path, trace: &FileTrace) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let name = format!("{}.json", slugify(&trace.filename));
        let path = dir.join(name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(trace)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_writer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path(), "pass-1", false);
        writer.persist(&FileTrace::new("race.mkv"));
        assert!(!dir.path().join("traces").exists());
    }

    #[test]
    fn enabled_writer_persists_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path(), "pass-1", true);
        let mut trace = FileTrace::new("Formula.1.2025.Round05.Monaco.Race.mkv");
        trace.status = "linked".to_string();
        trace.pattern_id = Some("round-based".to_string());
        writer.persist(&trace);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("traces/pass-1"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
        let body = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "linked");
    }
}
