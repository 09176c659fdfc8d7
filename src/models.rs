//! Canonical metadata model and per-pass bookkeeping types
//!
//! `RawShow` mirrors the provider's wire format; `Show`/`Season`/`Episode`
//! are the normalized model every other subsystem works against. The raw
//! structs never leave the metadata layer.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Show metadata as returned by the provider, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShow {
    pub show: RawShowInfo,
    #[serde(default)]
    pub seasons: Vec<RawSeason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShowInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeason {
    pub key: String,
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub episodes: Vec<RawEpisode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEpisode {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub originally_available: Option<NaiveDate>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A fully normalized show. Built once per pass and shared immutably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    /// Globally unique per sport.
    pub id: String,
    /// Normalized title used for matching.
    pub title: String,
    /// Original casing from the source ("NTT" stays "NTT").
    pub display_title: String,
    /// Case-folded, deduplicated.
    pub aliases: Vec<String>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    /// Opaque identifier used by `key` season selectors.
    pub key: String,
    /// Canonical season index; `(show, number)` uniquely identifies a season.
    pub number: u32,
    /// Sport-specific round when the source distinguishes it, else `number`.
    pub round_number: u32,
    pub year: Option<i32>,
    pub title: String,
    pub aliases: Vec<String>,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// `(season, number)` uniquely identifies an episode.
    pub number: u32,
    /// May differ from `number` for league-specific formatting.
    pub display_number: u32,
    pub title: String,
    pub summary: Option<String>,
    /// In the sport's nominal timezone.
    pub originally_available: Option<NaiveDate>,
    pub aliases: Vec<String>,
    /// Case-folded union of title, aliases, and pattern session aliases.
    pub session_tokens: Vec<String>,
}

impl Season {
    pub fn episode_by_number(&self, number: u32) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.number == number)
    }
}

impl Show {
    pub fn season_by_number(&self, number: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.number == number)
    }
}

/// Durable record of an already-processed source file.
///
/// `pattern_priority` and `session_exact` carry the specificity data the
/// linker needs to decide overwrites on later passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub source_fingerprint: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub link_mode: String,
    pub pattern_id: String,
    pub pattern_priority: i32,
    pub session_exact: bool,
    pub sport_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome counters for a single pass, tallied overall and per sport.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassStats {
    pub processed: u64,
    pub skipped: u64,
    pub ignored: u64,
    pub failed: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub skipped_reasons: HashMap<String, u64>,
    pub failed_reasons: HashMap<String, u64>,
    pub by_sport: HashMap<String, SportCounters>,
    /// Sports dropped this pass (metadata or compile failure).
    pub sports_skipped: Vec<String>,
    /// Destinations written, or would-write under dry run.
    pub destinations: Vec<PathBuf>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SportCounters {
    pub processed: u64,
    pub skipped: u64,
    pub ignored: u64,
    pub failed: u64,
}

impl PassStats {
    pub fn register_processed(&mut self, sport_id: &str) {
        self.processed += 1;
        self.by_sport.entry(sport_id.to_string()).or_default().processed += 1;
    }

    pub fn register_skipped(&mut self, sport_id: &str, reason: &str) {
        self.skipped += 1;
        *self.skipped_reasons.entry(reason.to_string()).or_default() += 1;
        self.by_sport.entry(sport_id.to_string()).or_default().skipped += 1;
    }

    pub fn register_ignored(&mut self, sport_id: Option<&str>) {
        self.ignored += 1;
        if let Some(id) = sport_id {
            self.by_sport.entry(id.to_string()).or_default().ignored += 1;
        }
    }

    pub fn register_failed(&mut self, sport_id: &str, reason: &str, detail: String) {
        self.failed += 1;
        *self.failed_reasons.entry(reason.to_string()).or_default() += 1;
        self.errors.push(detail);
        self.by_sport.entry(sport_id.to_string()).or_default().failed += 1;
    }

    pub fn register_warning(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    pub fn has_activity(&self) -> bool {
        self.processed > 0 || self.skipped > 0 || self.failed > 0
    }
}
