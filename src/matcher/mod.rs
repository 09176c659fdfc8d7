//! Matching engine: pattern compilation and (sport, season, episode) selection
//!
//! Declarative pattern rules are compiled once per pass into immutable
//! `CompiledPattern`s, validated against both the regex and the show
//! metadata. Matching is deterministic: patterns are tried in ascending
//! priority, then the structured parser runs as a fallback, and every
//! tie-break is explicit.

pub mod dates;
pub mod episodes;
pub mod seasons;
pub mod session_index;
pub mod similarity;
pub mod structured;
pub mod teams;

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

use crate::config::{DestinationOverrides, PatternConfig, SeasonSelectorMode, SportConfig};
use crate::models::{Season, Show};
use crate::services::text_utils::normalize_token;
use episodes::{select_episode, EpisodeSelect};
use session_index::SessionLookupIndex;
use structured::{
    parse_structured_filename, score_structured_match, StructuredName, STRUCTURED_SCORE_THRESHOLD,
};

/// Default alias groups for common motorsport session terms, merged into
/// every session lookup unless the pattern defines the canonical token.
const GENERIC_SESSION_ALIASES: &[(&str, &[&str])] = &[
    (
        "Race",
        &[
            "Race", "Main Race", "Feature Race", "Main Event", "Feature Event", "Grand Prix", "GP",
        ],
    ),
    (
        "Practice",
        &[
            "Practice", "Practice Session", "Free Practice", "FP", "Warmup", "Warm-up", "Warm Up",
        ],
    ),
    (
        "Qualifying",
        &["Qualifying", "Quali", "Qualification", "Qualifying Session", "Q Session"],
    ),
    (
        "Sprint",
        &["Sprint", "Sprint Race", "Sprint Qualifying", "SQ"],
    ),
];

#[derive(Debug, Error)]
pub enum PatternCompileError {
    #[error("pattern '{pattern}' has an invalid regex: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern '{pattern}' references unknown capture group '{group}'")]
    UnknownCaptureGroup { pattern: String, group: String },
    #[error("pattern '{pattern}' uses a date selector but no episode carries a date")]
    DateSelectorWithoutDates { pattern: String },
}

/// Reason-coded matching failure, reported per file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFailure {
    #[error("no pattern matched")]
    NoPatternMatched,
    #[error("season not found")]
    SeasonNotFound,
    #[error("episode not found")]
    EpisodeNotFound,
    #[error("ambiguous match")]
    Ambiguous,
    #[error("sport disabled")]
    SportDisabled,
    #[error("ignored by filter")]
    IgnoredByFilter,
}

impl MatchFailure {
    /// Stable reason code for summaries and traces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPatternMatched => "no-pattern-matched",
            Self::SeasonNotFound => "season-not-found",
            Self::EpisodeNotFound => "episode-not-found",
            Self::Ambiguous => "ambiguous",
            Self::SportDisabled => "sport-disabled",
            Self::IgnoredByFilter => "ignored-by-filter",
        }
    }
}

/// A pattern rule compiled for matching; immutable after compilation.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub rule: PatternConfig,
    pub regex: Regex,
    pub session_lookup: SessionLookupIndex,
}

/// A successful match, by season/episode number so callers can look the
/// entities up in their own `Show` snapshot.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub season_number: u32,
    pub episode_number: u32,
    pub pattern_id: String,
    pub pattern_priority: i32,
    /// True when the episode was pinned by an exact (non-fuzzy) session
    /// token; feeds overwrite specificity.
    pub session_exact: bool,
    pub groups: HashMap<String, String>,
    pub destination_overrides: Option<DestinationOverrides>,
}

/// Priority reserved for the structured fallback: weaker than any
/// configured pattern, but still stronger than an unknown provenance
/// (`i32::MAX`) in overwrite comparisons.
pub const STRUCTURED_PATTERN_PRIORITY: i32 = i32::MAX - 1;

/// Compile a sport's patterns against its normalized show metadata.
pub fn compile_patterns(
    sport: &SportConfig,
    show: &Show,
) -> Result<Vec<CompiledPattern>, PatternCompileError> {
    let mut compiled = Vec::with_capacity(sport.patterns.len());
    for rule in &sport.patterns {
        let regex = RegexBuilder::new(&rule.regex)
            .case_insensitive(true)
            .build()
            .map_err(|source| PatternCompileError::InvalidRegex {
                pattern: rule.id(),
                source,
            })?;

        validate_group_references(rule, &regex)?;

        if rule.season_selector.mode == SeasonSelectorMode::Date
            && !show
                .seasons
                .iter()
                .any(|s| s.episodes.iter().any(|e| e.originally_available.is_some()))
        {
            return Err(PatternCompileError::DateSelectorWithoutDates {
                pattern: rule.id(),
            });
        }

        let session_lookup = build_session_lookup(rule, show);
        compiled.push(CompiledPattern {
            rule: rule.clone(),
            regex,
            session_lookup,
        });
    }
    Ok(compiled)
}

fn validate_group_references(
    rule: &PatternConfig,
    regex: &Regex,
) -> Result<(), PatternCompileError> {
    let names: Vec<&str> = regex.capture_names().flatten().collect();
    let has = |group: &str| names.contains(&group);

    if let Some(group) = &rule.season_selector.group {
        if !has(group) {
            return Err(PatternCompileError::UnknownCaptureGroup {
                pattern: rule.id(),
                group: group.clone(),
            });
        }
    }
    if let Some(template) = &rule.season_selector.value_template {
        for key in template_keys(template) {
            if !has(&key) {
                return Err(PatternCompileError::UnknownCaptureGroup {
                    pattern: rule.id(),
                    group: key,
                });
            }
        }
    }
    // The episode group must exist unless the rule can resolve without it.
    let selector = &rule.episode_selector;
    if !has(&selector.group)
        && selector.default_value.is_none()
        && !selector.allow_fallback_to_title
    {
        return Err(PatternCompileError::UnknownCaptureGroup {
            pattern: rule.id(),
            group: selector.group.clone(),
        });
    }
    Ok(())
}

fn template_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(end_offset) = rest[start + 1..].find('}') else {
            break;
        };
        let inner = &rest[start + 1..start + 1 + end_offset];
        let key = inner.split(':').next().unwrap_or(inner);
        if !key.is_empty() {
            keys.push(key.to_string());
        }
        rest = &rest[start + 1 + end_offset + 1..];
    }
    keys
}

/// Index every session token for a sport: episode titles and aliases across
/// all seasons, the rule's session aliases, and the generic defaults.
fn build_session_lookup(rule: &PatternConfig, show: &Show) -> SessionLookupIndex {
    let mut index = SessionLookupIndex::new();

    for season in &show.seasons {
        for episode in &season.episodes {
            index.add(&normalize_token(&episode.title), &episode.title);
            for alias in &episode.aliases {
                index.add(&normalize_token(alias), &episode.title);
            }
        }
    }

    for (canonical, aliases) in &rule.session_aliases {
        index.add_if_absent(&normalize_token(canonical), canonical);
        for alias in aliases {
            index.add_if_absent(&normalize_token(alias), canonical);
        }
    }

    for (canonical, aliases) in GENERIC_SESSION_ALIASES {
        let normalized = normalize_token(canonical);
        // A pattern that redefines the canonical token owns it outright.
        if index.get_direct(&normalized).is_some() && rule.session_aliases.contains_key(*canonical)
        {
            continue;
        }
        index.add_if_absent(&normalized, canonical);
        for alias in *aliases {
            index.add_if_absent(&normalize_token(alias), canonical);
        }
    }

    index
}

/// Generic session alias table in normalized form, for the structured
/// parser's session-tail detection.
pub fn generic_session_alias_map() -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (canonical, aliases) in GENERIC_SESSION_ALIASES {
        map.insert(normalize_token(canonical), canonical.to_string());
        for alias in *aliases {
            map.insert(normalize_token(alias), canonical.to_string());
        }
    }
    map
}

/// Match a filename against a sport's compiled patterns and metadata.
///
/// Pattern pass first (ascending priority), structured fallback second.
pub fn match_file(
    filename: &str,
    sport: &SportConfig,
    show: &Show,
    patterns: &[CompiledPattern],
    alias_lookup: &HashMap<String, String>,
) -> Result<MatchOutcome, MatchFailure> {
    if !sport.enabled {
        return Err(MatchFailure::SportDisabled);
    }
    let mut matched_any = false;
    let mut season_resolved = false;
    let mut saw_ambiguity = false;

    for pattern in patterns {
        let Some(captures) = pattern.regex.captures(filename) else {
            continue;
        };

        let mut groups: HashMap<String, String> = HashMap::new();
        for name in pattern.regex.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                groups.insert(name.to_string(), value.as_str().to_string());
            }
        }

        // A year variant only accepts files from its own year; a mismatch
        // reads as "not matched" so a sibling variant can claim the file.
        if let (Some(variant_year), Some(captured)) = (sport.variant_year, groups.get("year")) {
            if let Ok(year) = captured.parse::<i32>() {
                if year != variant_year {
                    debug!(
                        sport = %sport.id,
                        pattern = %pattern.rule.id(),
                        captured_year = year,
                        variant_year,
                        "Year mismatch, deferring to sibling variant"
                    );
                    continue;
                }
            }
        }
        matched_any = true;

        if !groups.contains_key("date_year")
            && ["year", "month", "day"].iter().all(|k| groups.contains_key(*k))
        {
            let year = groups["year"].clone();
            groups.insert("date_year".to_string(), year);
        }

        let Some(season) = seasons::select_season(show, &pattern.rule.season_selector, &groups)
        else {
            debug!(
                sport = %sport.id,
                pattern = %pattern.rule.id(),
                filename,
                "Season not resolved"
            );
            continue;
        };
        season_resolved = true;

        match select_episode(
            &pattern.rule,
            season,
            &pattern.session_lookup,
            &mut groups,
            alias_lookup,
        ) {
            EpisodeSelect::Found(resolution) => {
                return Ok(MatchOutcome {
                    season_number: season.number,
                    episode_number: resolution.episode_number,
                    pattern_id: pattern.rule.id(),
                    pattern_priority: pattern.rule.priority,
                    session_exact: resolution.exact_session,
                    groups,
                    destination_overrides: pattern.rule.destination_overrides.clone(),
                });
            }
            EpisodeSelect::Ambiguous => {
                saw_ambiguity = true;
                debug!(
                    sport = %sport.id,
                    pattern = %pattern.rule.id(),
                    season = %season.title,
                    filename,
                    "Episode resolution ambiguous"
                );
            }
            EpisodeSelect::NotFound => {
                debug!(
                    sport = %sport.id,
                    pattern = %pattern.rule.id(),
                    season = %season.title,
                    filename,
                    "Episode not resolved"
                );
            }
        }
    }

    // Structured fallback for names no declarative pattern understood.
    let structured_had_signal = match structured_pass(filename, sport, show, alias_lookup) {
        StructuredPass::Matched(outcome) => return Ok(outcome),
        StructuredPass::NoCandidate => true,
        StructuredPass::NoSignal => false,
    };

    if saw_ambiguity {
        Err(MatchFailure::Ambiguous)
    } else if season_resolved || structured_had_signal {
        // The name parsed into teams/date/round but nothing in the
        // metadata cleared the score threshold.
        Err(MatchFailure::EpisodeNotFound)
    } else if matched_any {
        Err(MatchFailure::SeasonNotFound)
    } else {
        Err(MatchFailure::NoPatternMatched)
    }
}

enum StructuredPass {
    /// Nothing parseable in the name.
    NoSignal,
    /// Parsed, but no episode cleared the threshold.
    NoCandidate,
    Matched(MatchOutcome),
}

/// Score the structured parse against candidate episodes. Candidates come
/// from the round/week/date-derived season when one resolves, otherwise
/// from every season. Equal scores break to the lowest (season, episode).
fn structured_pass(
    filename: &str,
    sport: &SportConfig,
    show: &Show,
    alias_lookup: &HashMap<String, String>,
) -> StructuredPass {
    let session_aliases = generic_session_alias_map();
    let Some(structured) = parse_structured_filename(filename, alias_lookup, &session_aliases)
    else {
        return StructuredPass::NoSignal;
    };

    // Year variants reject other years here too, so a sibling variant can
    // claim the file instead.
    if let Some(variant_year) = sport.variant_year {
        let parsed_year = structured
            .year
            .or_else(|| structured.date.map(|d| chrono::Datelike::year(&d)));
        if let Some(year) = parsed_year {
            if year != variant_year {
                return StructuredPass::NoSignal;
            }
        }
    }

    // The parser can mistake the competition name for a team; treat that
    // as a failed parse rather than matching garbage.
    if let Some(competition) = &structured.competition {
        let competition_token = normalize_token(competition);
        if structured
            .teams
            .iter()
            .any(|team| normalize_token(team) == competition_token)
        {
            return StructuredPass::NoSignal;
        }
    }

    let candidate_seasons: Vec<&Season> = derive_season(&structured, show)
        .map(|season| vec![season])
        .unwrap_or_else(|| show.seasons.iter().collect());

    let mut best: Option<(&Season, &crate::models::Episode)> = None;
    let mut best_score = 0.0_f64;
    for season in candidate_seasons {
        for episode in &season.episodes {
            let score = score_structured_match(&structured, season, episode, alias_lookup);
            // Strict > over ascending (season, episode) order makes the
            // earliest candidate win exact ties.
            if score > best_score {
                best_score = score;
                best = Some((season, episode));
            }
        }
    }

    let Some((season, episode)) = best else {
        return StructuredPass::NoCandidate;
    };
    if best_score < STRUCTURED_SCORE_THRESHOLD {
        return StructuredPass::NoCandidate;
    }

    let mut groups = HashMap::new();
    if let Some(date) = structured.date {
        groups.insert("structured_date".to_string(), date.to_string());
    }
    if !structured.teams.is_empty() {
        groups.insert("structured_matchup".to_string(), structured.teams.join(" vs "));
    }
    if let Some(session) = &structured.session {
        groups.insert("session".to_string(), session.clone());
    }

    debug!(
        filename,
        season = %season.title,
        episode = %episode.title,
        score = best_score,
        "Matched via structured filename parser"
    );

    StructuredPass::Matched(MatchOutcome {
        season_number: season.number,
        episode_number: episode.number,
        pattern_id: "structured".to_string(),
        pattern_priority: STRUCTURED_PATTERN_PRIORITY,
        session_exact: false,
        groups,
        destination_overrides: None,
    })
}

/// Derive the candidate season from round, week, then date.
fn derive_season<'a>(structured: &StructuredName, show: &'a Show) -> Option<&'a Season> {
    if let Some(round) = structured.round {
        if let Some(season) = show
            .seasons
            .iter()
            .find(|s| s.round_number == round || s.number == round)
        {
            return Some(season);
        }
    }
    if let Some(week) = structured.week {
        if let Some(season) = show.seasons.iter().find(|s| {
            s.number == week || normalize_token(&s.title) == normalize_token(&format!("Week {week}"))
        }) {
            return Some(season);
        }
    }
    if let Some(date) = structured.date {
        return show.seasons.iter().find(|season| {
            season
                .episodes
                .iter()
                .any(|e| e.originally_available == Some(date))
        });
    }
    None
}
