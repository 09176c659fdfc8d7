//! Raw-to-canonical metadata normalization
//!
//! Converts the provider's wire format into the `Show` model everything
//! else consumes, preserving acronym casing, deriving round numbers, and
//! precomputing per-episode session tokens and the per-sport team alias
//! lookup used by structured matching.

use std::collections::{HashMap, HashSet};

use crate::config::SportConfig;
use crate::matcher::teams::{build_team_alias_lookup, configured_alias_map};
use crate::models::{Episode, RawShow, Season, Show};
use crate::services::text_utils::{normalize_token, smart_title_case};

/// Normalize a raw metadata document into the canonical model.
///
/// Normalization is a fixed point: feeding a normalized show's fields back
/// through produces identical output.
pub fn normalize_show(raw: &RawShow, sport: &SportConfig) -> Show {
    let mut seasons: Vec<Season> = raw
        .seasons
        .iter()
        .map(|raw_season| {
            let mut episodes: Vec<Episode> = raw_season
                .episodes
                .iter()
                .map(|raw_episode| {
                    let session_tokens =
                        session_tokens_for(&raw_episode.title, &raw_episode.aliases, sport);
                    Episode {
                        number: raw_episode.number,
                        display_number: raw_episode.number,
                        title: smart_title_case(&raw_episode.title),
                        summary: raw_episode.summary.clone(),
                        originally_available: raw_episode.originally_available,
                        aliases: fold_aliases(&raw_episode.aliases),
                        session_tokens,
                    }
                })
                .collect();
            episodes.sort_by_key(|e| e.number);
            dedupe_episode_numbers(&mut episodes);

            Season {
                key: raw_season.key.clone(),
                number: raw_season.number,
                round_number: raw_season.round.unwrap_or(raw_season.number),
                year: raw_season.year,
                title: smart_title_case(&raw_season.title),
                aliases: fold_aliases(&raw_season.aliases),
                episodes,
            }
        })
        .collect();
    seasons.sort_by_key(|s| s.number);

    Show {
        id: raw.show.id.clone(),
        title: smart_title_case(&raw.show.title),
        display_title: raw.show.title.clone(),
        aliases: fold_aliases(&raw.show.aliases),
        seasons,
    }
}

/// Build the per-sport alias lookup: configured map merged with entities
/// mined from the normalized episode titles and aliases.
pub fn build_alias_lookup(show: &Show, sport: &SportConfig) -> HashMap<String, String> {
    let configured = configured_alias_map(sport.team_alias_map.as_deref(), &sport.team_aliases);
    build_team_alias_lookup(show, &configured)
}

/// Union of the episode title, its aliases, and pattern-injected session
/// aliases, case-folded and with empties dropped.
fn session_tokens_for(title: &str, aliases: &[String], sport: &SportConfig) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |value: &str| {
        let normalized = normalize_token(value);
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            tokens.push(normalized);
        }
    };

    push(title);
    for alias in aliases {
        push(alias);
    }

    let title_token = normalize_token(title);
    for pattern in &sport.patterns {
        for (canonical, pattern_aliases) in &pattern.session_aliases {
            if normalize_token(canonical) == title_token {
                for alias in pattern_aliases {
                    push(alias);
                }
            }
        }
    }
    tokens
}

/// Case-folded, deduplicated aliases; originals are folded in place since
/// alias comparison is always token-normalized.
fn fold_aliases(aliases: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    aliases
        .iter()
        .map(|a| a.to_lowercase())
        .filter(|a| !a.trim().is_empty() && seen.insert(a.clone()))
        .collect()
}

/// Episodes within a season must have unique numbers; later duplicates are
/// shifted past the occupied range, keeping their relative order.
fn dedupe_episode_numbers(episodes: &mut [Episode]) {
    let mut seen = HashSet::new();
    let mut next_free = episodes.iter().map(|e| e.number).max().unwrap_or(0);
    for episode in episodes.iter_mut() {
        if !seen.insert(episode.number) {
            next_free += 1;
            episode.number = next_free;
            seen.insert(episode.number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::{RawEpisode, RawSeason, RawShowInfo};

    fn sport() -> SportConfig {
        let doc = r#"
            source_dir = "/s"
            destination_dir = "/d"
            cache_dir = "/c"

            [[sports]]
            id = "indycar"
            show_ref = "indycar-2025"

            [[sports.file_patterns]]
            regex = "(?P<session>race)"
            [sports.file_patterns.session_aliases]
            Race = ["Main Event", "Feature"]
        "#;
        AppConfig::from_toml(doc).unwrap().sports.remove(0)
    }

    fn raw() -> RawShow {
        RawShow {
            show: RawShowInfo {
                id: "indycar-2025".into(),
                title: "NTT indycar series".into(),
                summary: None,
                aliases: vec!["IndyCar".into(), "INDYCAR".into(), "indycar".into()],
            },
            seasons: vec![RawSeason {
                key: "3".into(),
                number: 3,
                title: "the thermal club grand prix".into(),
                round: Some(3),
                year: Some(2025),
                aliases: vec![],
                episodes: vec![
                    RawEpisode {
                        number: 2,
                        title: "Race".into(),
                        summary: None,
                        originally_available: None,
                        aliases: vec!["Main Race".into()],
                    },
                    RawEpisode {
                        number: 1,
                        title: "qualifying".into(),
                        summary: None,
                        originally_available: None,
                        aliases: vec![],
                    },
                ],
            }],
        }
    }

    #[test]
    fn acronyms_survive_title_casing() {
        let show = normalize_show(&raw(), &sport());
        assert_eq!(show.title, "NTT Indycar Series");
        assert_eq!(show.display_title, "NTT indycar series");
    }

    #[test]
    fn aliases_are_folded_and_deduplicated() {
        let show = normalize_show(&raw(), &sport());
        assert_eq!(show.aliases, vec!["indycar".to_string()]);
    }

    #[test]
    fn round_defaults_and_episode_ordering() {
        let show = normalize_show(&raw(), &sport());
        let season = &show.seasons[0];
        assert_eq!(season.round_number, 3);
        // Episodes sorted by number after normalization.
        assert_eq!(season.episodes[0].number, 1);
        assert_eq!(season.episodes[0].title, "Qualifying");
    }

    #[test]
    fn session_tokens_include_pattern_aliases() {
        let show = normalize_show(&raw(), &sport());
        let race = show.seasons[0].episode_by_number(2).unwrap();
        assert!(race.session_tokens.contains(&"race".to_string()));
        assert!(race.session_tokens.contains(&"mainrace".to_string()));
        assert!(race.session_tokens.contains(&"mainevent".to_string()));
        assert!(race.session_tokens.contains(&"feature".to_string()));
        assert!(race.session_tokens.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn normalization_is_idempotent() {
        let sport = sport();
        let show = normalize_show(&raw(), &sport);

        // Re-feed the normalized model as if it were raw.
        let refed = RawShow {
            show: RawShowInfo {
                id: show.id.clone(),
                title: show.title.clone(),
                summary: None,
                aliases: show.aliases.clone(),
            },
            seasons: show
                .seasons
                .iter()
                .map(|s| RawSeason {
                    key: s.key.clone(),
                    number: s.number,
                    title: s.title.clone(),
                    round: Some(s.round_number),
                    year: s.year,
                    aliases: s.aliases.clone(),
                    episodes: s
                        .episodes
                        .iter()
                        .map(|e| RawEpisode {
                            number: e.number,
                            title: e.title.clone(),
                            summary: e.summary.clone(),
                            originally_available: e.originally_available,
                            aliases: e.aliases.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };
        let again = normalize_show(&refed, &sport);
        assert_eq!(show.title, again.title);
        assert_eq!(show.aliases, again.aliases);
        for (a, b) in show.seasons.iter().zip(again.seasons.iter()) {
            assert_eq!(a.title, b.title);
            assert_eq!(a.round_number, b.round_number);
            for (x, y) in a.episodes.iter().zip(b.episodes.iter()) {
                assert_eq!(x.title, y.title);
                assert_eq!(x.session_tokens, y.session_tokens);
            }
        }
    }

    #[test]
    fn duplicate_episode_numbers_are_shifted() {
        let mut doc = raw();
        doc.seasons[0].episodes[1].number = 2;
        let show = normalize_show(&doc, &sport());
        let numbers: Vec<u32> = show.seasons[0].episodes.iter().map(|e| e.number).collect();
        assert_eq!(numbers.len(), 2);
        assert_ne!(numbers[0], numbers[1]);
    }
}
