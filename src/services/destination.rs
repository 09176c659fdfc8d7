//! Destination path construction
//!
//! Renders the root-folder, season-folder, and filename templates against
//! the match context, sanitizes every rendered segment, and refuses any
//! path that would escape the destination root.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::DestinationTemplates;
use crate::models::{Episode, Season, Show};
use crate::services::template::{render_template, TemplateContext, TemplateError, TemplateValue};

/// Longest sanitized segment, in characters. Most filesystems cap names at
/// 255 bytes; staying under that leaves room for multi-byte characters.
const MAX_SEGMENT_CHARS: usize = 240;

/// Longest full destination path.
const MAX_PATH_CHARS: usize = 4000;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("unsafe destination path: {0}")]
    UnsafePath(String),
    #[error("destination name too long: {0}")]
    NameTooLong(String),
}

/// Build the full template context for a match. Capture groups are merged
/// last and never shadow the built-in keys.
#[allow(clippy::too_many_arguments)]
pub fn build_match_context(
    sport_id: &str,
    sport_name: &str,
    show: &Show,
    season: &Season,
    episode: &Episode,
    source_path: &Path,
    source_dir: &Path,
    groups: &HashMap<String, String>,
) -> TemplateContext {
    let mut context = TemplateContext::new();
    let mut set = |key: &str, value: TemplateValue| {
        context.insert(key.to_string(), value);
    };

    set("sport_id", sport_id.into());
    set("sport_name", sport_name.into());
    set("show_title", show.title.as_str().into());
    set("show_display_title", show.display_title.as_str().into());

    set("season_title", season.title.as_str().into());
    set("season_number", season.number.into());
    set("season_round", season.round_number.into());
    if let Some(year) = season.year {
        set("season_year", (year as i64).into());
    }

    set("episode_title", episode.title.as_str().into());
    set("episode_number", episode.number.into());
    set("episode_display_number", episode.display_number.into());
    if let Some(summary) = &episode.summary {
        set("episode_summary", summary.as_str().into());
    }
    if let Some(date) = episode.originally_available {
        set("episode_originally_available", date.to_string().into());
    }

    let filename = source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = source_path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = source_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    set("source_filename", filename.into());
    set("source_stem", stem.into());
    set("suffix", format!(".{extension}").into());
    set("extension", extension.into());
    let relative = source_path
        .strip_prefix(source_dir)
        .unwrap_or(source_path)
        .to_string_lossy()
        .to_string();
    set("relative_source", relative.into());

    for (key, value) in groups {
        context
            .entry(key.clone())
            .or_insert_with(|| TemplateValue::Str(value.clone()));
    }

    context
}

/// Render and sanitize the destination path for a match.
pub fn build_destination(
    destination_dir: &Path,
    templates: &DestinationTemplates,
    context: &TemplateContext,
) -> Result<PathBuf, DestinationError> {
    let root = sanitize_segment(&render_template(&templates.root_template, context)?)?;
    let season = sanitize_segment(&render_template(&templates.season_dir_template, context)?)?;
    let filename = sanitize_segment(&render_template(&templates.filename_template, context)?)?;

    let destination = destination_dir.join(&root).join(&season).join(&filename);

    // Sanitized segments cannot contain separators, so only a `..`-style
    // segment could escape; verify against the normalized path anyway.
    if !normalized(&destination).starts_with(normalized(destination_dir)) {
        return Err(DestinationError::UnsafePath(
            destination.display().to_string(),
        ));
    }
    if destination.to_string_lossy().chars().count() > MAX_PATH_CHARS {
        return Err(DestinationError::NameTooLong(
            destination.display().to_string(),
        ));
    }

    Ok(destination)
}

/// Sanitize one rendered path segment.
///
/// Strips control characters, replaces path separators with a single space,
/// collapses whitespace, trims, and truncates to a platform-safe length.
/// Sanitizing an already-sanitized segment is a fixed point.
pub fn sanitize_segment(segment: &str) -> Result<String, DestinationError> {
    let replaced: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let mut collapsed = replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.chars().count() > MAX_SEGMENT_CHARS {
        collapsed = collapsed.chars().take(MAX_SEGMENT_CHARS).collect();
        collapsed = collapsed.trim_end().to_string();
    }

    if collapsed.is_empty() {
        return Err(DestinationError::UnsafePath(
            "empty path segment after sanitization".into(),
        ));
    }
    if collapsed == "." || collapsed == ".." {
        return Err(DestinationError::UnsafePath(format!(
            "path segment '{collapsed}' is not allowed"
        )));
    }
    Ok(collapsed)
}

/// Lexical normalization: resolve `.` and `..` without touching the
/// filesystem.
fn normalized(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestinationTemplates;
    use chrono::NaiveDate;

    fn context() -> TemplateContext {
        let show = Show {
            id: "f1-2025".into(),
            title: "Formula 1 2025".into(),
            display_title: "Formula 1 2025".into(),
            aliases: vec![],
            seasons: vec![],
        };
        let season = Season {
            key: "5".into(),
            number: 5,
            round_number: 5,
            year: Some(2025),
            title: "Monaco Grand Prix".into(),
            aliases: vec![],
            episodes: vec![],
        };
        let episode = Episode {
            number: 6,
            display_number: 6,
            title: "Race".into(),
            summary: None,
            originally_available: NaiveDate::from_ymd_opt(2025, 5, 25),
            aliases: vec![],
            session_tokens: vec![],
        };
        build_match_context(
            "formula1_2025",
            "Formula 1",
            &show,
            &season,
            &episode,
            Path::new("/src/Formula.1.2025.Round05.Monaco.Race.mkv"),
            Path::new("/src"),
            &HashMap::new(),
        )
    }

    #[test]
    fn renders_canonical_layout() {
        let templates = DestinationTemplates {
            root_template: "{show_title}".into(),
            season_dir_template: "{season_number:02} {season_title}".into(),
            filename_template:
                "{sport_name} - S{season_number:02}E{episode_number:02} - {episode_title}.{extension}"
                    .into(),
        };
        let destination =
            build_destination(Path::new("/library"), &templates, &context()).unwrap();
        assert_eq!(
            destination,
            PathBuf::from(
                "/library/Formula 1 2025/05 Monaco Grand Prix/Formula 1 - S05E06 - Race.mkv"
            )
        );
    }

    #[test]
    fn missing_key_is_a_template_error() {
        let templates = DestinationTemplates {
            root_template: "{no_such_key}".into(),
            ..Default::default()
        };
        let err = build_destination(Path::new("/library"), &templates, &context()).unwrap_err();
        assert!(matches!(err, DestinationError::Template(_)));
    }

    #[test]
    fn traversal_segments_are_rejected() {
        assert!(matches!(
            sanitize_segment(".."),
            Err(DestinationError::UnsafePath(_))
        ));
        assert!(matches!(
            sanitize_segment("   "),
            Err(DestinationError::UnsafePath(_))
        ));
    }

    #[test]
    fn separators_collapse_to_single_spaces() {
        assert_eq!(
            sanitize_segment("AC/DC  \\  Live").unwrap(),
            "AC DC Live"
        );
        assert_eq!(sanitize_segment("a\x07b").unwrap(), "a b");
    }

    #[test]
    fn sanitization_is_a_fixed_point() {
        let long = "x".repeat(500);
        for raw in ["AC/DC Live", "  padded  ", long.as_str(), "Tab\tbed"] {
            let once = sanitize_segment(raw).unwrap();
            let twice = sanitize_segment(&once).unwrap();
            assert_eq!(once, twice, "not a fixed point for {raw:?}");
        }
    }

    #[test]
    fn long_segments_are_truncated_not_rejected() {
        let long = "y".repeat(1000);
        let sanitized = sanitize_segment(&long).unwrap();
        assert_eq!(sanitized.chars().count(), 240);
    }

    #[test]
    fn acronym_casing_flows_through_untouched() {
        let mut ctx = context();
        ctx.insert(
            "show_title".to_string(),
            TemplateValue::Str("NTT INDYCAR Series".into()),
        );
        let templates = DestinationTemplates::default();
        let destination = build_destination(Path::new("/library"), &templates, &ctx).unwrap();
        assert!(destination
            .to_string_lossy()
            .contains("NTT INDYCAR Series"));
    }
}
