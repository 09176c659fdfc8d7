//! End-to-end matching scenarios
//!
//! Each scenario drives a full pass through the processor with a scripted
//! metadata provider and a real temp filesystem: discover, load metadata,
//! match, build the destination, link, and report.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sideline::config::AppConfig;
use sideline::metadata::provider::{FetchedMetadata, MetadataProvider, ProviderError};
use sideline::models::PassStats;
use sideline::services::processor::Processor;

/// Provider that serves a fixed JSON document for every show reference.
struct ScriptedProvider {
    payload: String,
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    async fn fetch(&self, _show_ref: &str) -> Result<FetchedMetadata, ProviderError> {
        Ok(FetchedMetadata {
            raw: serde_json::from_str(&self.payload).expect("scripted payload parses"),
            payload: self.payload.clone().into_bytes(),
        })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    source: std::path::PathBuf,
    destination: std::path::PathBuf,
    processor: Processor,
}

impl Harness {
    fn new(config_body: &str, metadata: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let destination = dir.path().join("library");
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&destination).unwrap();
        std::fs::create_dir_all(&cache).unwrap();

        let doc = format!(
            r#"
            source_dir = "{}"
            destination_dir = "{}"
            cache_dir = "{}"
            {config_body}
            "#,
            source.display(),
            destination.display(),
            cache.display(),
        );
        let config = Arc::new(AppConfig::from_toml(&doc).unwrap());
        let provider = Arc::new(ScriptedProvider {
            payload: metadata.to_string(),
        });
        let processor = Processor::new(config, provider, None);
        Self {
            _dir: dir,
            source,
            destination,
            processor,
        }
    }

    fn drop_file(&self, name: &str) {
        std::fs::write(self.source.join(name), b"video payload").unwrap();
    }

    async fn run(&self) -> PassStats {
        self.processor.run_pass(&CancellationToken::new()).await
    }

    fn assert_linked(&self, relative: &str) {
        let path = self.destination.join(relative);
        assert!(path.exists(), "expected destination {}", path.display());
    }

    fn destination_count(&self) -> usize {
        walk_files(&self.destination).len()
    }
}

fn walk_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    if !root.exists() {
        return out;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

const F1_CONFIG: &str = r#"
    [[sports]]
    id = "formula1_2025"
    name = "Formula 1"
    show_ref = "formula-1-2025"

    [sports.destination]
    filename_template = "{sport_name} - S{season_number:02}E{episode_number:02} - {episode_title}.{extension}"

    [[sports.file_patterns]]
    regex = "Formula.?1\\.(?P<year>\\d{4})\\.Round(?P<round>\\d{2})\\.(?P<location>[A-Za-z]+)\\.(?P<session>[A-Za-z0-9]+)\\.mkv"
    description = "round-based"
    priority = 10
    season_selector = { mode = "round", group = "round" }
    episode_selector = { group = "session" }
"#;

const F1_METADATA: &str = r#"{
    "show": {"id": "formula-1-2025", "title": "Formula 1 2025"},
    "seasons": [
        {
            "key": "5", "number": 5, "round": 5, "year": 2025,
            "title": "Monaco Grand Prix",
            "episodes": [
                {"number": 1, "title": "FP1"},
                {"number": 2, "title": "FP2"},
                {"number": 3, "title": "FP3"},
                {"number": 4, "title": "Qualifying"},
                {"number": 5, "title": "Sprint"},
                {"number": 6, "title": "Race"}
            ]
        }
    ]
}"#;

#[tokio::test]
async fn round_based_motorsport_lands_in_canonical_layout() {
    let harness = Harness::new(F1_CONFIG, F1_METADATA);
    harness.drop_file("Formula.1.2025.Round05.Monaco.Race.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 1, "errors: {:?}", stats.errors);
    assert_eq!(stats.failed, 0);
    harness.assert_linked(
        "Formula 1 2025/05 Monaco Grand Prix/Formula 1 - S05E06 - Race.mkv",
    );
}

#[tokio::test]
async fn empty_source_directory_is_a_clean_noop() {
    let harness = Harness::new(F1_CONFIG, F1_METADATA);
    let stats = harness.run().await;
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 0);
    assert!(stats.errors.is_empty());
    assert_eq!(harness.destination_count(), 0);
}

const NBA_CONFIG: &str = r#"
    [[sports]]
    id = "nba_2025"
    name = "NBA"
    show_ref = "nba-2025-26"
    team_alias_map = "nba"
"#;

fn nba_metadata(episodes: &str) -> String {
    format!(
        r#"{{
            "show": {{"id": "nba-2025-26", "title": "NBA 2025-26"}},
            "seasons": [
                {{
                    "key": "1", "number": 1, "title": "Regular Season",
                    "episodes": [{episodes}]
                }}
            ]
        }}"#
    )
}

#[tokio::test]
async fn two_team_matchup_disambiguates_by_date() {
    // Same matchup twice in a season; only the date separates them.
    let metadata = nba_metadata(
        r#"
        {"number": 10, "title": "Boston Celtics vs Indiana Pacers",
         "originally_available": "2025-11-01"},
        {"number": 12, "title": "Indiana Pacers vs Boston Celtics",
         "originally_available": "2025-12-22"}
        "#,
    );
    let harness = Harness::new(NBA_CONFIG, &metadata);
    harness.drop_file("NBA RS 2025 Indiana Pacers vs Boston Celtics 22 12.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 1, "errors: {:?}", stats.errors);
    let linked = walk_files(&harness.destination);
    assert_eq!(linked.len(), 1);
    assert!(
        linked[0].to_string_lossy().contains("S01E12"),
        "wrong episode: {}",
        linked[0].display()
    );
}

#[tokio::test]
async fn wrong_away_team_is_rejected_even_with_matching_date() {
    // Boston plays Miami on the filename's date; Indiana appears nowhere.
    // Team-set equality is required, so nothing may link.
    let metadata = nba_metadata(
        r#"
        {"number": 12, "title": "Boston Celtics vs Miami Heat",
         "originally_available": "2025-12-22"}
        "#,
    );
    let harness = Harness::new(NBA_CONFIG, &metadata);
    harness.drop_file("NBA RS 2025 Indiana Pacers vs Boston Celtics 22 12.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.failed, 1);
    assert!(stats.failed_reasons.contains_key("episode-not-found"));
    assert_eq!(harness.destination_count(), 0);
}

const NHL_CONFIG: &str = r#"
    [[sports]]
    id = "nhl_2025"
    name = "NHL"
    show_ref = "nhl-2025-26"
    team_alias_map = "nhl"

    [[sports.file_patterns]]
    regex = "NHL-(?P<y>\\d{4})-(?P<m>\\d{2})-(?P<d>\\d{2})_(?P<away>[A-Z]{2,3})@(?P<home>[A-Z]{2,3})\\.mkv"
    description = "calendar-date"
    priority = 20
    season_selector = { mode = "date", value_template = "{y}-{m:02}-{d:02}" }
    episode_selector = { group = "session" }
"#;

#[tokio::test]
async fn calendar_date_selector_resolves_season_and_teams() {
    let metadata = r#"{
        "show": {"id": "nhl-2025-26", "title": "NHL 2025-26"},
        "seasons": [
            {
                "key": "1", "number": 1, "title": "October",
                "episodes": [
                    {"number": 3, "title": "New Jersey Devils vs Philadelphia Flyers",
                     "originally_available": "2025-10-04"}
                ]
            },
            {
                "key": "2", "number": 2, "title": "November",
                "episodes": [
                    {"number": 7, "title": "Boston Bruins vs Montreal Canadiens",
                     "originally_available": "2025-11-21"},
                    {"number": 9, "title": "New Jersey Devils vs Philadelphia Flyers",
                     "originally_available": "2025-11-22"}
                ]
            }
        ]
    }"#;
    let harness = Harness::new(NHL_CONFIG, metadata);
    harness.drop_file("NHL-2025-11-22_NJD@PHI.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 1, "errors: {:?}", stats.errors);
    let linked = walk_files(&harness.destination);
    assert_eq!(linked.len(), 1);
    let path = linked[0].to_string_lossy();
    assert!(path.contains("S02E09"), "wrong episode: {path}");
}

#[tokio::test]
async fn structured_tie_breaks_to_earliest_episode() {
    // Both games fall within the date-proximity window and share the team
    // set, so the scores tie; the lower episode number must win.
    let metadata = nba_metadata(
        r#"
        {"number": 4, "title": "Indiana Pacers vs Boston Celtics",
         "originally_available": "2025-12-22"},
        {"number": 8, "title": "Boston Celtics vs Indiana Pacers",
         "originally_available": "2025-12-23"}
        "#,
    );
    let harness = Harness::new(NBA_CONFIG, &metadata);
    harness.drop_file("NBA RS 2025 Indiana Pacers vs Boston Celtics 22 12.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 1, "errors: {:?}", stats.errors);
    let linked = walk_files(&harness.destination);
    assert!(
        linked[0].to_string_lossy().contains("S01E04"),
        "tie must break to the earliest episode: {}",
        linked[0].display()
    );
}

#[tokio::test]
async fn sample_files_are_suppressed_not_failed() {
    let harness = Harness::new(F1_CONFIG, F1_METADATA);
    harness.drop_file("Formula.1.2025.Round99.Nowhere.Race.sample.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.ignored, 1);
}

#[tokio::test]
async fn glob_filter_excludes_foreign_files() {
    let config = r#"
        [[sports]]
        id = "formula1_2025"
        name = "Formula 1"
        show_ref = "formula-1-2025"
        source_globs = ["*Formula*"]

        [[sports.file_patterns]]
        regex = "Round(?P<round>\\d{2})\\.[A-Za-z]+\\.(?P<session>[A-Za-z0-9]+)\\.mkv"
        priority = 10
        season_selector = { mode = "round", group = "round" }
        episode_selector = { group = "session" }
    "#;
    let harness = Harness::new(config, F1_METADATA);
    harness.drop_file("MotoGP.Round05.Monaco.Race.mkv");

    let stats = harness.run().await;
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.ignored, 1);
    assert_eq!(harness.destination_count(), 0);
}
