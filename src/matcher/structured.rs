//! Structured filename parsing and scoring for team sports
//!
//! When no declarative pattern resolves, filenames like
//! `NHL-2025-11-22_NJD@PHI.mkv` or `NBA RS 2025 Pacers vs Celtics 22 12.mkv`
//! still carry enough structure to match: teams around a separator, a date
//! in one of several shapes, a round/week marker, and sometimes a session
//! tail. The scorer ranks candidate episodes under strict team-set and
//! date-proximity rules.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::dates::{dates_within_proximity, parse_date_string};
use super::similarity::token_similarity;
use super::teams::extract_teams_from_text;
use crate::models::{Episode, Season};
use crate::services::text_utils::normalize_token;

/// Minimum total score for a structured match to be accepted.
pub const STRUCTURED_SCORE_THRESHOLD: f64 = 0.6;

const SCORE_DATE_PROXIMITY: f64 = 0.4;
const SCORE_TEAM_SET: f64 = 0.55;
const SCORE_SESSION_EXACT: f64 = 0.2;
const SCORE_SESSION_FUZZY: f64 = 0.1;
const SCORE_YEAR_ONLY: f64 = 0.1;
const SCORE_ROUND: f64 = 0.1;

/// Fields a structured parse can extract from a release name.
#[derive(Debug, Clone, Default)]
pub struct StructuredName {
    pub raw: String,
    pub competition: Option<String>,
    pub teams: Vec<String>,
    pub date: Option<NaiveDate>,
    pub round: Option<u32>,
    pub week: Option<u32>,
    pub session: Option<String>,
    pub year: Option<i32>,
}

impl StructuredName {
    /// Enough signal to be worth scoring: teams, or a date, or round/week.
    fn has_signal(&self) -> bool {
        !self.teams.is_empty()
            || self.date.is_some()
            || self.round.is_some()
            || self.week.is_some()
    }
}

fn full_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{4})[-./ ](\d{1,2})[-./ ](\d{1,2})\b").expect("valid regex")
    })
}

fn dmy_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[-./ ](\d{1,2})[-./ ](\d{4})\b").expect("valid regex")
    })
}

fn trailing_partial_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})[-._ ](\d{1,2})\s*$").expect("valid regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid regex"))
}

fn round_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:round|rd)\.?\s*(\d{1,2})\b").expect("valid regex"))
}

fn week_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:week|wk)\.?\s*(\d{1,2})\b").expect("valid regex"))
}

/// Parse a filename into its structured components. Returns `None` when the
/// name carries too little signal to score.
pub fn parse_structured_filename(
    filename: &str,
    alias_lookup: &HashMap<String, String>,
    session_aliases: &HashMap<String, String>,
) -> Option<StructuredName> {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, ext)| if ext.len() <= 4 { stem } else { filename })
        .unwrap_or(filename);
    let cleaned = stem.replace(['.', '_'], " ");

    let mut parsed = StructuredName {
        raw: filename.to_string(),
        ..Default::default()
    };

    parsed.competition = cleaned
        .split_whitespace()
        .next()
        .filter(|token| token.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|token| token.to_string());

    // A standalone four-digit year that is not part of a full date.
    let mut date_spans: Vec<(usize, usize)> = Vec::new();

    if let Some(caps) = full_date_re().captures(&cleaned) {
        let y: i32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        let d: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            parsed.date = Some(date);
            let span = caps.get(0).unwrap();
            date_spans.push((span.start(), span.end()));
        }
    }

    if parsed.date.is_none() {
        if let Some(caps) = dmy_date_re().captures(&cleaned) {
            let first: u32 = caps[1].parse().ok()?;
            let second: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            // Day-first when unambiguous or when both could be a day;
            // month-first only when the first number cannot be a month.
            let date = if first > 12 {
                NaiveDate::from_ymd_opt(year, second, first)
            } else if second > 12 {
                NaiveDate::from_ymd_opt(year, first, second)
            } else {
                NaiveDate::from_ymd_opt(year, second, first)
            };
            if let Some(date) = date {
                parsed.date = Some(date);
                let span = caps.get(0).unwrap();
                date_spans.push((span.start(), span.end()));
            }
        }
    }

    for caps in year_re().captures_iter(&cleaned) {
        let span = caps.get(1).unwrap();
        let inside_date = date_spans
            .iter()
            .any(|(start, end)| span.start() >= *start && span.end() <= *end);
        if !inside_date {
            parsed.year = caps[1].parse().ok();
            break;
        }
    }

    // Trailing `DD MM` after the team names, resolved against the
    // standalone year found elsewhere in the name.
    if parsed.date.is_none() {
        if let Some(caps) = trailing_partial_date_re().captures(cleaned.trim_end()) {
            let raw = format!("{} {}", &caps[1], &caps[2]);
            if let Some(date) = parse_date_string(&raw, parsed.year) {
                parsed.date = Some(date);
            }
        }
    }

    if let Some(caps) = round_re().captures(&cleaned) {
        parsed.round = caps[1].parse().ok();
    }
    if let Some(caps) = week_re().captures(&cleaned) {
        parsed.week = caps[1].parse().ok();
    }

    parsed.teams = extract_teams_from_text(&cleaned, alias_lookup);

    // A session tail: the last alphabetic token that resolves through the
    // session alias table ("Race", "Qualifying", ...).
    if !session_aliases.is_empty() {
        for token in cleaned.split_whitespace().rev().take(3) {
            let normalized = normalize_token(token);
            if normalized.is_empty() {
                continue;
            }
            if let Some(canonical) = session_aliases.get(&normalized) {
                parsed.session = Some(canonical.clone());
                break;
            }
        }
    }

    if parsed.has_signal() {
        Some(parsed)
    } else {
        None
    }
}

/// Score a candidate episode against a structured parse.
///
/// Hard rejections return 0.0: date present on both sides but out of
/// proximity, or a two-team matchup whose team set is not fully covered.
pub fn score_structured_match(
    structured: &StructuredName,
    season: &Season,
    episode: &Episode,
    alias_lookup: &HashMap<String, String>,
) -> f64 {
    let mut score = 0.0;
    let episode_teams = extract_teams_from_text(&episode.title, alias_lookup);

    let structured_tokens: std::collections::HashSet<String> = structured
        .teams
        .iter()
        .filter(|t| !t.is_empty())
        .map(|team| {
            let normalized = normalize_token(team);
            let resolved = alias_lookup.get(&normalized).cloned().unwrap_or_else(|| team.clone());
            normalize_token(&resolved)
        })
        .collect();
    let episode_tokens: std::collections::HashSet<String> = episode_teams
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| normalize_token(t))
        .collect();

    // Same teams play many times a season; a date on both sides MUST agree.
    if structured.date.is_some() && episode.originally_available.is_some() {
        if !dates_within_proximity(structured.date, episode.originally_available) {
            return 0.0;
        }
        score += SCORE_DATE_PROXIMITY;
    }

    if !structured_tokens.is_empty() && !episode_tokens.is_empty() {
        if structured_tokens == episode_tokens {
            score += SCORE_TEAM_SET;
        } else {
            let overlap = structured_tokens.intersection(&episode_tokens).count();
            // Two-team matchups require full team-set coverage; a partial
            // overlap means a different game.
            if structured.teams.len() >= 2 {
                return 0.0;
            }
            if overlap > 0 {
                score += SCORE_TEAM_SET * (overlap as f64 / structured_tokens.len() as f64) * 0.6;
            }
        }
    } else if !structured_tokens.is_empty() {
        let combined = normalize_token(&structured.teams.join(" "));
        if !combined.is_empty()
            && token_similarity(&combined, &normalize_token(&episode.title)) >= 0.7
        {
            score += 0.3;
        }
    }

    if let Some(session) = &structured.session {
        let session_token = normalize_token(session);
        let episode_token = normalize_token(&episode.title);
        if episode
            .session_tokens
            .iter()
            .any(|t| t == &session_token)
            || episode_token == session_token
        {
            score += SCORE_SESSION_EXACT;
        } else if token_similarity(&session_token, &episode_token) >= 0.85 {
            score += SCORE_SESSION_FUZZY;
        }
    }

    // Year-only agreement, weaker than a full date.
    if structured.date.is_none() {
        if let (Some(year), Some(available)) = (structured.year, episode.originally_available) {
            if available.year() == year {
                score += SCORE_YEAR_ONLY;
            }
        }
    }

    if let Some(round) = structured.round {
        if season.round_number == round || season.number == round {
            score += SCORE_ROUND;
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::teams::builtin_alias_map;

    fn empty_sessions() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn parses_iso_date_with_teams() {
        let lookup = builtin_alias_map("nhl");
        let parsed =
            parse_structured_filename("NHL-2025-11-22_NJD@PHI.mkv", &lookup, &empty_sessions())
                .unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2025, 11, 22));
        assert_eq!(
            parsed.teams,
            vec!["New Jersey Devils", "Philadelphia Flyers"]
        );
        assert_eq!(parsed.competition.as_deref(), Some("NHL"));
    }

    #[test]
    fn parses_trailing_day_month_with_external_year() {
        let lookup = builtin_alias_map("nba");
        let parsed = parse_structured_filename(
            "NBA RS 2025 Indiana Pacers vs Boston Celtics 22 12.mkv",
            &lookup,
            &empty_sessions(),
        )
        .unwrap();
        assert_eq!(parsed.year, Some(2025));
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2025, 12, 22));
        assert_eq!(parsed.teams, vec!["Indiana Pacers", "Boston Celtics"]);
    }

    #[test]
    fn parses_round_and_week_markers() {
        let parsed = parse_structured_filename(
            "Supercross Round 4 Anaheim.mkv",
            &HashMap::new(),
            &empty_sessions(),
        )
        .unwrap();
        assert_eq!(parsed.round, Some(4));

        let parsed =
            parse_structured_filename("NFL Wk 12 2025.mkv", &HashMap::new(), &empty_sessions())
                .unwrap();
        assert_eq!(parsed.week, Some(12));
    }

    #[test]
    fn insufficient_signal_returns_none() {
        assert!(parse_structured_filename(
            "random documentary.mkv",
            &HashMap::new(),
            &empty_sessions()
        )
        .is_none());
    }

    #[test]
    fn date_mismatch_rejects_candidate() {
        let lookup = builtin_alias_map("nba");
        let structured = StructuredName {
            teams: vec!["Indiana Pacers".into(), "Boston Celtics".into()],
            date: NaiveDate::from_ymd_opt(2025, 12, 22),
            ..Default::default()
        };
        let season = season_with_episode("Indiana Pacers vs Boston Celtics", 2025, 11, 1);
        let score =
            score_structured_match(&structured, &season, &season.episodes[0], &lookup);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn partial_team_overlap_rejects_two_team_matchup() {
        let lookup = builtin_alias_map("nba");
        let structured = StructuredName {
            teams: vec!["Indiana Pacers".into(), "Boston Celtics".into()],
            ..Default::default()
        };
        let season = season_with_episode("Boston Celtics vs Miami Heat", 2025, 12, 22);
        let score =
            score_structured_match(&structured, &season, &season.episodes[0], &lookup);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn matching_teams_and_date_clear_threshold() {
        let lookup = builtin_alias_map("nba");
        let structured = StructuredName {
            teams: vec!["Indiana Pacers".into(), "Boston Celtics".into()],
            date: NaiveDate::from_ymd_opt(2025, 12, 22),
            ..Default::default()
        };
        let season = season_with_episode("Indiana Pacers vs Boston Celtics", 2025, 12, 22);
        let score =
            score_structured_match(&structured, &season, &season.episodes[0], &lookup);
        assert!(score >= STRUCTURED_SCORE_THRESHOLD, "score was {score}");
    }

    fn season_with_episode(title: &str, y: i32, m: u32, d: u32) -> Season {
        Season {
            key: "1".into(),
            number: 1,
            round_number: 1,
            year: Some(y),
            title: "Regular Season".into(),
            aliases: vec![],
            episodes: vec![Episode {
                number: 1,
                display_number: 1,
                title: title.into(),
                summary: None,
                originally_available: NaiveDate::from_ymd_opt(y, m, d),
                aliases: vec![],
                session_tokens: vec![],
            }],
        }
    }
}
