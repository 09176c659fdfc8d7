//! Durable record of already-processed source files
//!
//! A line-based JSON log at `cache_dir/processed.db`: one record per line,
//! loaded at startup, mutated in memory during a pass, and committed by
//! temp-file + atomic rename at pass end. Corruption on read is logged and
//! treated as an empty cache; the next pass simply re-derives everything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::metadata::MetadataChange;
use crate::models::ProcessedRecord;

pub struct ProcessedCache {
    path: PathBuf,
    records: HashMap<PathBuf, ProcessedRecord>,
    dirty: bool,
}

impl ProcessedCache {
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join("processed.db");
        let mut records = HashMap::new();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                for (index, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ProcessedRecord>(line) {
                        Ok(record) => {
                            records.insert(record.source_path.clone(), record);
                        }
                        Err(err) => {
                            warn!(
                                path = %path.display(),
                                line = index + 1,
                                error = %err,
                                "Skipping corrupt processed-cache line"
                            );
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read processed cache, starting empty");
            }
        }
        debug!(records = records.len(), "Processed cache loaded");
        Self {
            path,
            records,
            dirty: false,
        }
    }

    /// Skip rule: same source fingerprint AND same target destination.
    pub fn is_processed(&self, source: &Path, fingerprint: &str, destination: &Path) -> bool {
        self.records
            .get(source)
            .map(|record| {
                record.source_fingerprint == fingerprint
                    && record.destination_path == destination
            })
            .unwrap_or(false)
    }

    /// The record for a source path regardless of destination.
    pub fn get(&self, source: &Path) -> Option<&ProcessedRecord> {
        self.records.get(source)
    }

    /// All records, for per-pass snapshotting.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessedRecord> {
        self.records.values()
    }

    pub fn mark_processed(&mut self, record: ProcessedRecord) {
        self.records.insert(record.source_path.clone(), record);
        self.dirty = true;
    }

    pub fn remove(&mut self, source: &Path) -> Option<ProcessedRecord> {
        let removed = self.records.remove(source);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records belonging to sports whose metadata changed, returning
    /// them so the processor can clean up their stale destinations after a
    /// successful relink.
    pub fn remove_by_metadata_changes(
        &mut self,
        changes: &HashMap<String, MetadataChange>,
    ) -> HashMap<PathBuf, ProcessedRecord> {
        let mut removed = HashMap::new();
        let affected: Vec<PathBuf> = self
            .records
            .values()
            .filter(|record| changes.get(&record.sport_id).map(|c| c.updated).unwrap_or(false))
            .map(|record| record.source_path.clone())
            .collect();
        for source in affected {
            if let Some(record) = self.records.remove(&source) {
                removed.insert(source, record);
            }
        }
        if !removed.is_empty() {
            self.dirty = true;
            debug!(
                invalidated = removed.len(),
                "Invalidated processed records after metadata change"
            );
        }
        removed
    }

    /// Commit the batch: serialize every record, write a temp sibling, and
    /// rename it over `processed.db`.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut lines: Vec<String> = self
            .records
            .values()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()
            .context("serializing processed records")?;
        lines.sort();
        let body = lines.join("\n") + "\n";

        let tmp = self.path.with_extension("db.tmp");
        std::fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} into place", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(source: &str, destination: &str, sport: &str) -> ProcessedRecord {
        ProcessedRecord {
            source_fingerprint: format!("fp-{source}"),
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(destination),
            link_mode: "hardlink".into(),
            pattern_id: "test".into(),
            pattern_priority: 100,
            session_exact: true,
            sport_id: sport.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn roundtrips_records_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = ProcessedCache::load(dir.path());
            cache.mark_processed(record("/src/a.mkv", "/lib/a.mkv", "f1"));
            cache.mark_processed(record("/src/b.mkv", "/lib/b.mkv", "nba"));
            cache.save().unwrap();
        }
        let cache = ProcessedCache::load(dir.path());
        assert_eq!(cache.len(), 2);
        assert!(cache.is_processed(
            Path::new("/src/a.mkv"),
            "fp-/src/a.mkv",
            Path::new("/lib/a.mkv")
        ));
        // Different destination means reprocessing is required.
        assert!(!cache.is_processed(
            Path::new("/src/a.mkv"),
            "fp-/src/a.mkv",
            Path::new("/lib/elsewhere.mkv")
        ));
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&record("/src/a.mkv", "/lib/a.mkv", "f1")).unwrap();
        std::fs::write(
            dir.path().join("processed.db"),
            format!("{good}\nnot-json\n"),
        )
        .unwrap();
        let cache = ProcessedCache::load(dir.path());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fully_corrupt_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("processed.db"), b"\xff\xfe garbage").unwrap();
        let cache = ProcessedCache::load(dir.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn metadata_changes_invalidate_matching_sport_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ProcessedCache::load(dir.path());
        cache.mark_processed(record("/src/a.mkv", "/lib/a.mkv", "f1"));
        cache.mark_processed(record("/src/b.mkv", "/lib/b.mkv", "nba"));

        let mut changes = HashMap::new();
        changes.insert(
            "f1".to_string(),
            MetadataChange {
                updated: true,
                ..Default::default()
            },
        );
        let removed = cache.remove_by_metadata_changes(&changes);
        assert_eq!(removed.len(), 1);
        assert!(removed.contains_key(Path::new("/src/a.mkv")));
        assert_eq!(cache.len(), 1);
    }
}
