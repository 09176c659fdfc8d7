//! Source tree discovery and per-sport file filtering
//!
//! Walks the source roots, drops symlinks, macOS resource forks, and other
//! non-candidates, and yields files in a stable lexicographic order so that
//! intra-pass tie-breaks resolve deterministically.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SportConfig;

/// Why a file was dropped before matching.
pub fn skip_reason(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_string_lossy();
    if name.starts_with("._") && name.len() > 2 {
        return Some("macOS resource fork");
    }
    None
}

/// Whether a filename looks like a sample/demo clip; such files are still
/// offered to the matcher but their no-match outcome is suppressed from
/// warnings.
pub fn is_sample_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == "sample")
}

/// Whether a file passes the sport's source glob filters. No globs means
/// everything passes.
pub fn matches_globs(path: &Path, sport: &SportConfig) -> bool {
    if sport.source_globs.is_empty() {
        return true;
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let full = path.to_string_lossy();
    sport
        .source_globs
        .iter()
        .any(|pattern| glob_match(pattern, &filename) || glob_match(pattern, &full))
}

/// Whether the extension is accepted by the sport.
pub fn matches_extension(path: &Path, sport: &SportConfig) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
    sport
        .source_extensions
        .iter()
        .any(|allowed| allowed.to_lowercase() == ext)
}

/// Discover candidate files under a source root, sorted lexicographically.
pub fn gather_source_files(source_dir: &Path) -> Vec<PathBuf> {
    if !source_dir.exists() {
        warn!(path = %source_dir.display(), "Source directory missing");
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path_is_symlink() {
            debug!(path = %path.display(), "Skipping symlink source");
            continue;
        }
        if let Some(reason) = skip_reason(path) {
            debug!(path = %path.display(), reason, "Skipping source file");
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    files
}

/// Minimal glob matching: `*` (any run), `?` (single char), literals.
/// Matches the shell-style patterns sports configure for source filtering.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                inner(&pattern[1..], text)
                    || (!text.is_empty() && inner(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => inner(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p.eq_ignore_ascii_case(t) => inner(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    inner(&pattern, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn sport(globs: &[&str]) -> SportConfig {
        let doc = format!(
            r#"
            source_dir = "/s"
            destination_dir = "/d"
            cache_dir = "/c"

            [[sports]]
            id = "f1"
            show_ref = "formula-1"
            source_globs = [{}]
            "#,
            globs
                .iter()
                .map(|g| format!("\"{g}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );
        AppConfig::from_toml(&doc).unwrap().sports.remove(0)
    }

    #[test]
    fn glob_matching_basics() {
        assert!(glob_match("*Formula*", "Formula.1.2025.mkv"));
        assert!(glob_match("*.mkv", "race.mkv"));
        assert!(!glob_match("*.mp4", "race.mkv"));
        assert!(glob_match("NBA?RS*", "NBA RS 2025.mkv"));
        assert!(glob_match("*formula*", "FORMULA.1.mkv"));
    }

    #[test]
    fn no_globs_accepts_everything() {
        let sport = sport(&[]);
        assert!(matches_globs(Path::new("/x/anything.mkv"), &sport));
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let sport = sport(&[]);
        assert!(matches_extension(Path::new("race.MKV"), &sport));
        assert!(!matches_extension(Path::new("race.nfo"), &sport));
        assert!(!matches_extension(Path::new("race"), &sport));
    }

    #[test]
    fn resource_forks_and_samples_are_flagged() {
        assert_eq!(
            skip_reason(Path::new("/x/._race.mkv")),
            Some("macOS resource fork")
        );
        assert_eq!(skip_reason(Path::new("/x/race.mkv")), None);
        assert!(is_sample_file(Path::new("/x/race-sample.mkv")));
        assert!(is_sample_file(Path::new("/x/Sample.mkv")));
        assert!(!is_sample_file(Path::new("/x/samples-of-greatness.mkv")));
    }

    #[test]
    fn discovery_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/z.mkv"), b"z").unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"a").unwrap();
        std::fs::write(dir.path().join("._fork.mkv"), b"x").unwrap();

        let files = gather_source_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.mkv"));
        assert!(files[1].ends_with("b/z.mkv"));
    }

    #[test]
    fn missing_source_dir_yields_nothing() {
        assert!(gather_source_files(Path::new("/definitely/not/here")).is_empty());
    }
}
