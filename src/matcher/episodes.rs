//! Episode selection within a season
//!
//! A matched pattern hands over its capture groups; this module turns them
//! into a concrete episode. The session capture rarely matches the episode
//! title verbatim, so the selector expands it into ordered lookup variants
//! (separator splits, truncated tails, away/home orderings, venue+session
//! combinations), resolves each through the session index (exact first,
//! fuzzy second), and finally falls back to round+location and date
//! proximity for motorsport and calendar content.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use super::dates::{dates_within_proximity, parse_date_from_groups, parse_date_string};
use super::session_index::SessionLookupIndex;
use super::similarity::{token_similarity, tokens_close};
use super::teams::{canonicalize_team, strip_team_noise};
use crate::config::PatternConfig;
use crate::models::{Episode, Season};
use crate::services::text_utils::normalize_token;

/// Broadcast and release tokens that pollute session captures.
const NOISE_TOKENS: &[&str] = &[
    "f1live", "f1tv", "f1kids", "sky", "intl", "international", "proper", "verum",
];

/// Similarity floor for fuzzy session resolution.
const FUZZY_SESSION_THRESHOLD: f64 = 0.85;

/// How an episode was pinned down; `exact_session` feeds overwrite
/// specificity downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeResolution {
    pub episode_number: u32,
    pub exact_session: bool,
}

/// Outcome of episode selection within one season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeSelect {
    Found(EpisodeResolution),
    NotFound,
    /// Several episodes matched the token and none could be separated by
    /// date proximity.
    Ambiguous,
}

fn part_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"part\d+").expect("valid regex"))
}

/// Strip noise tokens from a normalized session string.
fn strip_noise(normalized: &str) -> String {
    let mut result = normalized.to_string();
    for token in NOISE_TOKENS {
        if result.contains(token) {
            result = result.replace(token, "");
        }
    }
    result
}

fn tokens_match(candidate: &str, target: &str) -> bool {
    if candidate.is_empty() || target.is_empty() {
        return false;
    }
    if candidate == target {
        return true;
    }
    if candidate.starts_with(target) || target.starts_with(candidate) {
        return true;
    }
    tokens_close(candidate, target)
}

/// Resolve a normalized token through the session index: exact first, then
/// fuzzy over the bucketed candidates.
pub fn resolve_session_lookup<'a>(
    lookup: &'a SessionLookupIndex,
    token: &str,
) -> Option<(&'a str, bool)> {
    if let Some(canonical) = lookup.get_direct(token) {
        return Some((canonical, true));
    }
    if token.chars().count() < 4 {
        return None;
    }

    let mut best_key: Option<&str> = None;
    let mut best_score = 0.0;
    for candidate in lookup.get_candidates(token) {
        if candidate.chars().count() < 4 {
            continue;
        }
        if !tokens_close(candidate, token) {
            continue;
        }
        let mut score = token_similarity(candidate, token);
        if crate::services::text_utils::levenshtein_distance(candidate, token) <= 1 {
            score = score.max(0.92);
        }
        if score > best_score {
            best_key = Some(candidate);
            best_score = score;
        }
    }

    if best_score >= FUZZY_SESSION_THRESHOLD {
        best_key
            .and_then(|key| lookup.get_direct(key))
            .map(|canonical| (canonical, false))
    } else {
        None
    }
}

/// One candidate token to try against the season, in priority order.
struct LookupAttempt {
    normalized: String,
}

struct AttemptCollector {
    attempts: Vec<LookupAttempt>,
    seen: HashSet<String>,
}

impl AttemptCollector {
    fn new() -> Self {
        Self {
            attempts: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push_raw(&mut self, value: &str) {
        let mut variants: Vec<String> = vec![value.to_string()];

        let split: Vec<&str> = value
            .split(|c: char| c.is_whitespace() || matches!(c, '.' | '_' | '-'))
            .filter(|s| !s.is_empty())
            .collect();
        if !split.is_empty() {
            variants.push(split.join(" "));
            let without_noise: Vec<&str> = split
                .iter()
                .copied()
                .filter(|word| !strip_noise(&normalize_token(word)).is_empty())
                .collect();
            variants.push(without_noise.join(" "));
            // Truncated tails let "Sky F1 Qualifying" reach "Qualifying".
            for index in 1..split.len() {
                variants.push(split[index..].join(" "));
            }
        }

        for variant in variants {
            let normalized = strip_noise(&normalize_token(&variant));
            if normalized.is_empty() || self.seen.contains(&normalized) {
                continue;
            }
            self.seen.insert(normalized.clone());
            self.attempts.push(LookupAttempt { normalized });
        }
    }

    fn push_normalized(&mut self, normalized: String) {
        if !normalized.is_empty() && self.seen.insert(normalized.clone()) {
            self.attempts.push(LookupAttempt { normalized });
        }
    }
}

/// Select the matching episode within a season.
pub fn select_episode(
    rule: &PatternConfig,
    season: &Season,
    lookup: &SessionLookupIndex,
    groups: &mut HashMap<String, String>,
    alias_lookup: &HashMap<String, String>,
) -> EpisodeSelect {
    let group = &rule.episode_selector.group;
    let mut raw_value = groups
        .get(group)
        .cloned()
        .or_else(|| rule.episode_selector.default_value.clone());

    if raw_value.is_none() && rule.episode_selector.allow_fallback_to_title {
        // Longest indexed key contained anywhere in the captured text.
        let haystack = normalize_token(&groups.values().cloned().collect::<Vec<_>>().join(" "));
        let mut keys: Vec<&str> = lookup.keys().collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
        raw_value = keys
            .into_iter()
            .find(|key| !key.is_empty() && haystack.contains(*key))
            .map(|key| key.to_string());
    }

    let parsed_date = parse_date_from_groups(groups);

    let mut collector = AttemptCollector::new();

    if let Some(raw) = &raw_value {
        collector.push_raw(raw);
        let normalized = strip_noise(&normalize_token(raw));
        if normalized.contains("part") {
            // "Race Part1" should still find "Race".
            let without = part_suffix_re().replace_all(&normalized, "").trim().to_string();
            collector.push_normalized(without);
        }
    }

    // Sorted keys keep attempt order deterministic across runs.
    let mut other_keys: Vec<&String> = groups
        .keys()
        .filter(|k| *k != group && !k.starts_with('_'))
        .collect();
    other_keys.sort();
    for key in other_keys {
        if let Some(value) = groups.get(key).cloned() {
            collector.push_raw(&value);
        }
    }

    // Canonicalize team captures and derive ordered matchup variants.
    let away = groups.get("away").map(|v| strip_team_noise(v));
    let home = groups.get("home").map(|v| strip_team_noise(v));
    let away = away
        .as_deref()
        .map(|v| canonicalize_team(v, alias_lookup).unwrap_or_else(|| v.to_string()));
    let home = home
        .as_deref()
        .map(|v| canonicalize_team(v, alias_lookup).unwrap_or_else(|| v.to_string()));
    if let (Some(away), Some(home)) = (&away, &home) {
        groups.insert("away".to_string(), away.clone());
        groups.insert("home".to_string(), home.clone());
        groups.insert("session".to_string(), format!("{away} vs {home}"));
        let mut separators: Vec<String> = Vec::new();
        if let Some(sep) = groups.get("separator") {
            separators.push(sep.clone());
        }
        separators.extend(["at", "vs", "v", "@"].iter().map(|s| s.to_string()));
        let mut seen = HashSet::new();
        for sep in separators {
            if !seen.insert(normalize_token(&sep)) {
                continue;
            }
            collector.push_raw(&format!("{away} {sep} {home}"));
            collector.push_raw(&format!("{home} {sep} {away}"));
        }
    }

    if let (Some(venue), Some(raw)) = (groups.get("venue"), &raw_value) {
        collector.push_raw(&format!("{venue} {raw}"));
        collector.push_raw(&format!("{raw} {venue}"));
    }

    // Longest variants first: most specific token wins.
    let mut attempts = collector.attempts;
    attempts.sort_by_key(|a| std::cmp::Reverse(a.normalized.chars().count()));

    let mut saw_ambiguity = false;

    for attempt in &attempts {
        let resolved = resolve_session_lookup(lookup, &attempt.normalized);

        // A token that reached the canonical title through the lookup
        // carries the lookup's exactness; a raw token is exact only when
        // it equals the episode title verbatim.
        let mut candidate_tokens: Vec<(String, Option<bool>)> = Vec::new();
        if let Some((canonical, exact)) = resolved {
            candidate_tokens.push((normalize_token(canonical), Some(exact)));
        }
        candidate_tokens.push((attempt.normalized.clone(), None));

        for (token, exact_override) in candidate_tokens {
            if token.is_empty() {
                continue;
            }
            match find_episode_for_token(season, &token, parsed_date) {
                TokenSearch::Found(episode, exact_title) => {
                    return EpisodeSelect::Found(EpisodeResolution {
                        episode_number: episode,
                        exact_session: exact_override.unwrap_or(exact_title),
                    });
                }
                TokenSearch::Ambiguous => saw_ambiguity = true,
                TokenSearch::None => {}
            }
        }
    }

    // Round fallback for racing content where the session name never
    // appears in the episode title. Only valid when the round did not
    // already select the season; otherwise every session-based show would
    // resolve to whatever episode shares the round number.
    let round_selected_season =
        rule.season_selector.mode == crate::config::SeasonSelectorMode::Round;
    if let Some(round_value) = groups.get("round").filter(|_| !round_selected_season) {
        if let Ok(round) = round_value.parse::<u32>() {
            let location = groups.get("location").map(|v| normalize_token(v));
            if let Some(resolution) = select_by_round(season, round, location.as_deref()) {
                return EpisodeSelect::Found(resolution);
            }
        }
    }

    // Date fallback, covering partial event dates with a reference year.
    let fallback_date = parsed_date.or_else(|| {
        let event_date = groups.get("event_date")?;
        let reference_year = groups
            .get("year")
            .or_else(|| groups.get("date_year"))
            .and_then(|y| y.parse().ok());
        parse_date_string(event_date, reference_year)
    });
    if let Some(date) = fallback_date {
        let mut candidates: Vec<(&Episode, i64)> = season
            .episodes
            .iter()
            .filter_map(|episode| {
                let available = episode.originally_available?;
                if dates_within_proximity(Some(date), Some(available)) {
                    Some((episode, (date - available).num_days().abs()))
                } else {
                    None
                }
            })
            .collect();
        candidates.sort_by_key(|(episode, delta)| (*delta, episode.number));
        if let Some((episode, _)) = candidates.first() {
            return EpisodeSelect::Found(EpisodeResolution {
                episode_number: episode.number,
                exact_session: false,
            });
        }
    }

    if saw_ambiguity {
        EpisodeSelect::Ambiguous
    } else {
        EpisodeSelect::NotFound
    }
}

enum TokenSearch {
    Found(u32, bool),
    Ambiguous,
    None,
}

/// Match a token against episode titles and aliases; a date from the
/// filename filters candidates by proximity.
fn find_episode_for_token(
    season: &Season,
    token: &str,
    parsed_date: Option<chrono::NaiveDate>,
) -> TokenSearch {
    let mut matching: Vec<(&Episode, bool)> = Vec::new();
    for episode in &season.episodes {
        let episode_token = normalize_token(&episode.title);
        if tokens_match(&episode_token, token) {
            matching.push((episode, episode_token == token));
            continue;
        }
        if episode
            .aliases
            .iter()
            .any(|alias| tokens_match(&normalize_token(alias), token))
        {
            matching.push((episode, false));
        }
    }

    if matching.is_empty() {
        return TokenSearch::None;
    }

    if let Some(date) = parsed_date {
        let mut dated: Vec<(&Episode, bool, i64)> = matching
            .iter()
            .filter_map(|(episode, exact)| {
                let available = episode.originally_available?;
                if dates_within_proximity(Some(date), Some(available)) {
                    Some((*episode, *exact, (date - available).num_days().abs()))
                } else {
                    None
                }
            })
            .collect();
        if !dated.is_empty() {
            dated.sort_by_key(|(episode, _, delta)| (*delta, episode.number));
            let (episode, exact, _) = dated[0];
            return TokenSearch::Found(episode.number, exact);
        }
        // The token matched but every candidate's date disagrees. With one
        // candidate the date may simply be absent; with several this is a
        // genuine ambiguity.
        if matching.len() == 1 {
            let (episode, exact) = matching[0];
            return TokenSearch::Found(episode.number, exact);
        }
        return TokenSearch::Ambiguous;
    }

    let (episode, exact) = matching[0];
    TokenSearch::Found(episode.number, exact)
}

/// Round-number fallback with optional fuzzy location disambiguation.
/// Preference order: exact location containment, highest similarity above
/// the threshold, then lowest episode number.
fn select_by_round(
    season: &Season,
    round: u32,
    location: Option<&str>,
) -> Option<EpisodeResolution> {
    let mut round_episodes: Vec<&Episode> = season
        .episodes
        .iter()
        .filter(|e| e.number == round || e.display_number == round)
        .collect();
    if round_episodes.is_empty() {
        return None;
    }
    round_episodes.sort_by_key(|e| e.number);

    if let Some(location) = location.filter(|l| !l.is_empty()) {
        let mut best: Option<(&Episode, f64)> = None;
        for episode in &round_episodes {
            let title = normalize_token(&episode.title);
            if title.contains(location) {
                return Some(EpisodeResolution {
                    episode_number: episode.number,
                    exact_session: true,
                });
            }
            let similarity = best_window_similarity(location, &title);
            if similarity >= FUZZY_SESSION_THRESHOLD {
                match best {
                    Some((_, prev)) if prev >= similarity => {}
                    _ => best = Some((episode, similarity)),
                }
            }
        }
        if let Some((episode, _)) = best {
            return Some(EpisodeResolution {
                episode_number: episode.number,
                exact_session: false,
            });
        }
    }

    Some(EpisodeResolution {
        episode_number: round_episodes[0].number,
        exact_session: false,
    })
}

fn best_window_similarity(needle: &str, haystack: &str) -> f64 {
    let needle_chars: Vec<char> = needle.chars().collect();
    let haystack_chars: Vec<char> = haystack.chars().collect();
    if needle_chars.is_empty() {
        return 0.0;
    }
    if needle_chars.len() >= haystack_chars.len() {
        return token_similarity(needle, haystack);
    }
    let mut best: f64 = 0.0;
    for window in haystack_chars.windows(needle_chars.len()) {
        let segment: String = window.iter().collect();
        best = best.max(token_similarity(needle, &segment));
    }
    best
}
