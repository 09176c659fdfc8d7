//! Season selection from pattern capture groups
//!
//! Resolves which season a file belongs to according to the pattern's
//! declared selector mode: `round`, `key`, `title`, `sequential`, `week`,
//! or `date`.

use std::collections::HashMap;

use crate::config::{SeasonSelector, SeasonSelectorMode};
use crate::matcher::dates::parse_date_string;
use crate::models::{Season, Show};
use crate::services::template::{render_template, TemplateContext, TemplateValue};
use crate::services::text_utils::normalize_token;

/// Resolve the selector's raw value from the capture groups, honoring an
/// optional `value_template` that combines several groups.
pub fn resolve_selector_value(
    selector: &SeasonSelector,
    groups: &HashMap<String, String>,
    default_group: &str,
) -> Option<String> {
    if let Some(template) = &selector.value_template {
        let context: TemplateContext = groups
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::Str(v.clone())))
            .collect();
        let formatted = render_template(template, &context).ok()?;
        let formatted = formatted.trim().to_string();
        return if formatted.is_empty() { None } else { Some(formatted) };
    }
    let key = selector.group.as_deref().unwrap_or(default_group);
    groups.get(key).cloned()
}

/// Select a season for the given selector and capture groups.
pub fn select_season<'a>(
    show: &'a Show,
    selector: &SeasonSelector,
    groups: &HashMap<String, String>,
) -> Option<&'a Season> {
    match selector.mode {
        SeasonSelectorMode::Sequential => {
            let raw = resolve_selector_value(selector, groups, "season")?;
            let number: u32 = raw.parse().ok()?;
            show.seasons.iter().find(|s| s.number == number)
        }
        SeasonSelectorMode::Round => {
            let raw = resolve_selector_value(selector, groups, "round")?;
            let round: i64 = raw.parse::<i64>().ok()? + selector.offset;
            let round = u32::try_from(round).ok()?;
            show.seasons
                .iter()
                .find(|s| s.round_number == round || s.number == round)
                .or_else(|| {
                    // Positional fallback: Nth season in declaration order.
                    if round >= 1 && (round as usize) <= show.seasons.len() {
                        show.seasons.get(round as usize - 1)
                    } else {
                        None
                    }
                })
        }
        SeasonSelectorMode::Week => {
            let raw = resolve_selector_value(selector, groups, "week")?;
            let week: i64 = raw.parse::<i64>().ok()? + selector.offset;
            let week = u32::try_from(week).ok()?;
            show.seasons
                .iter()
                .find(|s| s.number == week)
                .or_else(|| {
                    let target = normalize_token(&format!("Week {week}"));
                    show.seasons
                        .iter()
                        .find(|s| normalize_token(&s.title) == target)
                })
        }
        SeasonSelectorMode::Key => {
            let key = resolve_selector_value(selector, groups, "season")?;
            show.seasons
                .iter()
                .find(|s| s.key == key)
                .or_else(|| {
                    let mapped = selector.mapping.get(&key)?;
                    show.seasons.iter().find(|s| s.number == *mapped)
                })
        }
        SeasonSelectorMode::Title => {
            let mut title = resolve_selector_value(selector, groups, "season")?;
            if !selector.aliases.is_empty() {
                let direct = selector.aliases.get(&title).cloned().or_else(|| {
                    let normalized = normalize_token(&title);
                    selector
                        .aliases
                        .iter()
                        .find(|(alias, _)| normalize_token(alias) == normalized)
                        .map(|(_, target)| target.clone())
                });
                if let Some(target) = direct {
                    title = target;
                }
            }
            let normalized = normalize_token(&title);
            if normalized.is_empty() {
                return None;
            }
            show.seasons
                .iter()
                .find(|s| normalize_token(&s.title) == normalized)
                .or_else(|| {
                    // Containment in either direction covers shortened
                    // season titles and venue suffixes.
                    show.seasons.iter().find(|s| {
                        let season_normalized = normalize_token(&s.title);
                        !season_normalized.is_empty()
                            && (season_normalized.contains(&normalized)
                                || normalized.contains(&season_normalized))
                    })
                })
                .or_else(|| {
                    let mapped = selector.mapping.get(&title)?;
                    show.seasons
                        .iter()
                        .find(|s| s.round_number == *mapped || s.number == *mapped)
                })
        }
        SeasonSelectorMode::Date => {
            let raw = resolve_selector_value(selector, groups, "date")?;
            let parsed = parse_date_string(&raw, None)?;
            show.seasons.iter().find(|season| {
                season
                    .episodes
                    .iter()
                    .any(|e| e.originally_available == Some(parsed))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Episode;
    use chrono::NaiveDate;

    fn show() -> Show {
        Show {
            id: "f1".into(),
            title: "Formula 1".into(),
            display_title: "Formula 1".into(),
            aliases: vec![],
            seasons: vec![
                season(4, "Suzuka Grand Prix", None),
                season(5, "Monaco Grand Prix", NaiveDate::from_ymd_opt(2025, 5, 25)),
            ],
        }
    }

    fn season(number: u32, title: &str, date: Option<NaiveDate>) -> Season {
        Season {
            key: number.to_string(),
            number,
            round_number: number,
            year: Some(2025),
            title: title.into(),
            aliases: vec![],
            episodes: vec![Episode {
                number: 1,
                display_number: 1,
                title: "Race".into(),
                summary: None,
                originally_available: date,
                aliases: vec![],
                session_tokens: vec![],
            }],
        }
    }

    fn groups(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn round_mode_matches_round_number() {
        let show = show();
        let selector = SeasonSelector::default();
        let season = select_season(&show, &selector, &groups(&[("round", "05")])).unwrap();
        assert_eq!(season.title, "Monaco Grand Prix");
    }

    #[test]
    fn round_mode_applies_offset() {
        let show = show();
        let selector = SeasonSelector {
            offset: 1,
            ..Default::default()
        };
        let season = select_season(&show, &selector, &groups(&[("round", "4")])).unwrap();
        assert_eq!(season.number, 5);
    }

    #[test]
    fn title_mode_matches_by_containment() {
        let show = show();
        let selector = SeasonSelector {
            mode: SeasonSelectorMode::Title,
            group: Some("location".into()),
            ..Default::default()
        };
        let season = select_season(&show, &selector, &groups(&[("location", "Monaco")])).unwrap();
        assert_eq!(season.number, 5);
    }

    #[test]
    fn date_mode_uses_value_template() {
        let show = show();
        let selector = SeasonSelector {
            mode: SeasonSelectorMode::Date,
            value_template: Some("{y}-{m:02}-{d:02}".into()),
            ..Default::default()
        };
        let season = select_season(
            &show,
            &selector,
            &groups(&[("y", "2025"), ("m", "5"), ("d", "25")]),
        )
        .unwrap();
        assert_eq!(season.title, "Monaco Grand Prix");
    }

    #[test]
    fn key_mode_falls_back_to_mapping() {
        let show = show();
        let selector = SeasonSelector {
            mode: SeasonSelectorMode::Key,
            mapping: [("monaco".to_string(), 5u32)].into_iter().collect(),
            ..Default::default()
        };
        let season = select_season(&show, &selector, &groups(&[("season", "monaco")])).unwrap();
        assert_eq!(season.number, 5);
    }

    #[test]
    fn unresolvable_value_returns_none() {
        let show = show();
        let selector = SeasonSelector::default();
        assert!(select_season(&show, &selector, &groups(&[("round", "99")])).is_none());
        assert!(select_season(&show, &selector, &groups(&[])).is_none());
    }
}
