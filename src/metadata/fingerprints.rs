//! Metadata fingerprinting and change detection
//!
//! Tracks a digest of each sport's normalized metadata, with per-season and
//! per-episode hashes, so a pass can tell exactly which parts of a show
//! changed since the last run and invalidate only the affected processed
//! records.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::Show;
use crate::services::fingerprint::digest_text;

/// Fingerprint of one show's metadata state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowFingerprint {
    pub digest: String,
    pub season_hashes: HashMap<String, String>,
    pub episode_hashes: HashMap<String, HashMap<String, String>>,
}

/// What changed between the stored fingerprint and the current one.
#[derive(Debug, Clone, Default)]
pub struct MetadataChange {
    pub updated: bool,
    pub changed_seasons: HashSet<String>,
    pub changed_episodes: HashMap<String, HashSet<String>>,
    pub invalidate_all: bool,
}

/// Compute the fingerprint for a normalized show.
pub fn compute_show_fingerprint(show: &Show, show_ref: &str) -> ShowFingerprint {
    let digest = digest_text(&format!(
        "{show_ref}\n{}",
        serde_json::to_string(show).unwrap_or_default()
    ));

    let mut season_hashes = HashMap::new();
    let mut episode_hashes = HashMap::new();
    for season in &show.seasons {
        let season_key = season.number.to_string();
        let season_payload = format!(
            "{}|{}|{}|{:?}|{:?}",
            season.key, season.title, season.round_number, season.year, season.aliases
        );
        season_hashes.insert(season_key.clone(), digest_text(&season_payload));

        let mut per_episode = HashMap::new();
        for episode in &season.episodes {
            let episode_payload = format!(
                "{}|{}|{:?}|{:?}|{:?}|{:?}",
                episode.display_number,
                episode.title,
                episode.summary,
                episode.originally_available,
                episode.aliases,
                episode.session_tokens
            );
            per_episode.insert(episode.number.to_string(), digest_text(&episode_payload));
        }
        episode_hashes.insert(season_key, per_episode);
    }

    ShowFingerprint {
        digest,
        season_hashes,
        episode_hashes,
    }
}

/// Persistent store under `cache_dir/state/metadata-digests.json`.
pub struct FingerprintStore {
    path: PathBuf,
    fingerprints: HashMap<String, ShowFingerprint>,
    dirty: bool,
}

impl FingerprintStore {
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join("state").join("metadata-digests.json");
        let fingerprints = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Malformed fingerprint store, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            fingerprints,
            dirty: false,
        }
    }

    pub fn get(&self, sport_id: &str) -> Option<&ShowFingerprint> {
        self.fingerprints.get(sport_id)
    }

    /// Store the new fingerprint and report what changed.
    pub fn update(&mut self, sport_id: &str, fingerprint: ShowFingerprint) -> MetadataChange {
        let existing = match self.fingerprints.get(sport_id) {
            None => {
                // First sighting: nothing stale to invalidate.
                self.fingerprints.insert(sport_id.to_string(), fingerprint);
                self.dirty = true;
                return MetadataChange {
                    updated: true,
                    ..Default::default()
                };
            }
            Some(existing) => existing.clone(),
        };

        if existing.digest == fingerprint.digest {
            return MetadataChange::default();
        }

        // An old-format entry without detail hashes cannot be diffed.
        if existing.season_hashes.is_empty() {
            self.fingerprints
                .insert(sport_id.to_string(), fingerprint);
            self.dirty = true;
            return MetadataChange {
                updated: true,
                invalidate_all: true,
                ..Default::default()
            };
        }

        let mut changed_seasons = HashSet::new();
        for (season_key, old_hash) in &existing.season_hashes {
            match fingerprint.season_hashes.get(season_key) {
                Some(new_hash) if new_hash == old_hash => {}
                _ => {
                    changed_seasons.insert(season_key.clone());
                }
            }
        }

        let mut changed_episodes: HashMap<String, HashSet<String>> = HashMap::new();
        for (season_key, old_map) in &existing.episode_hashes {
            if changed_seasons.contains(season_key) {
                continue;
            }
            let Some(new_map) = fingerprint.episode_hashes.get(season_key) else {
                changed_seasons.insert(season_key.clone());
                continue;
            };
            let changed: HashSet<String> = old_map
                .iter()
                .filter(|(key, old_hash)| new_map.get(*key) != Some(*old_hash))
                .map(|(key, _)| key.clone())
                .collect();
            if !changed.is_empty() {
                changed_episodes.insert(season_key.clone(), changed);
            }
        }

        self.fingerprints.insert(sport_id.to_string(), fingerprint);
        self.dirty = true;
        MetadataChange {
            updated: true,
            changed_seasons,
            changed_episodes,
            invalidate_all: false,
        }
    }

    /// Persist via temp file + rename; a failed save keeps the dirty flag.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self.fingerprints)?)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, Season};

    fn show(episode_title: &str) -> Show {
        Show {
            id: "f1".into(),
            title: "Formula 1".into(),
            display_title: "Formula 1".into(),
            aliases: vec![],
            seasons: vec![Season {
                key: "1".into(),
                number: 1,
                round_number: 1,
                year: Some(2025),
                title: "Season".into(),
                aliases: vec![],
                episodes: vec![Episode {
                    number: 1,
                    display_number: 1,
                    title: episode_title.into(),
                    summary: None,
                    originally_available: None,
                    aliases: vec![],
                    session_tokens: vec![],
                }],
            }],
        }
    }

    #[test]
    fn identical_metadata_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FingerprintStore::load(dir.path());
        let fp = compute_show_fingerprint(&show("Race"), "f1-2025");
        assert!(store.update("f1", fp.clone()).updated);
        let change = store.update("f1", fp);
        assert!(!change.updated);
    }

    #[test]
    fn episode_change_is_pinpointed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FingerprintStore::load(dir.path());
        store.update("f1", compute_show_fingerprint(&show("Race"), "f1-2025"));
        let change = store.update("f1", compute_show_fingerprint(&show("Sprint"), "f1-2025"));
        assert!(change.updated);
        assert!(change.changed_seasons.is_empty());
        assert_eq!(
            change.changed_episodes.get("1"),
            Some(&HashSet::from(["1".to_string()]))
        );
    }

    #[test]
    fn store_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fp = compute_show_fingerprint(&show("Race"), "f1-2025");
        {
            let mut store = FingerprintStore::load(dir.path());
            store.update("f1", fp.clone());
            store.save().unwrap();
        }
        let store = FingerprintStore::load(dir.path());
        assert_eq!(store.get("f1"), Some(&fp));
    }

    #[test]
    fn corrupt_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(state.join("metadata-digests.json"), b"garbage").unwrap();
        let store = FingerprintStore::load(dir.path());
        assert!(store.get("f1").is_none());
    }
}
