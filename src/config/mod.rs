//! Application configuration: loading, validation, and sport expansion
//!
//! The configuration is a TOML document overlaid by environment variables
//! and then CLI flags (lowest to highest precedence). Sports may declare
//! `variants`, each of which expands into an independent sport entry.
//! Pattern rules are resolved from named `pattern_sets` plus per-sport
//! `file_patterns` and sorted ascending by priority; lower priority wins.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unknown pattern set '{set}' referenced by sport '{sport}'")]
    UnknownPatternSet { set: String, sport: String },
    #[error("duplicate sport id '{0}'")]
    DuplicateSportId(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How a destination is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Hardlink,
    Copy,
    Symlink,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardlink => "hardlink",
            Self::Copy => "copy",
            Self::Symlink => "symlink",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hardlink" => Some(Self::Hardlink),
            "copy" => Some(Self::Copy),
            "symlink" => Some(Self::Symlink),
            _ => None,
        }
    }
}

/// Closed enumeration of season selector modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonSelectorMode {
    Round,
    Key,
    Title,
    Sequential,
    Week,
    Date,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonSelector {
    #[serde(default = "default_season_mode")]
    pub mode: SeasonSelectorMode,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub offset: i64,
    /// Combines capture groups into a single value, e.g. "{y}-{m:02}-{d:02}".
    #[serde(default)]
    pub value_template: Option<String>,
    /// key/title -> season number escape hatch for odd metadata.
    #[serde(default)]
    pub mapping: HashMap<String, u32>,
    /// title alias -> canonical season title.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_season_mode() -> SeasonSelectorMode {
    SeasonSelectorMode::Round
}

impl Default for SeasonSelector {
    fn default() -> Self {
        Self {
            mode: SeasonSelectorMode::Round,
            group: None,
            offset: 0,
            value_template: None,
            mapping: HashMap::new(),
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeSelector {
    #[serde(default = "default_episode_group")]
    pub group: String,
    #[serde(default = "default_true")]
    pub allow_fallback_to_title: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

fn default_episode_group() -> String {
    "session".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EpisodeSelector {
    fn default() -> Self {
        Self {
            group: "session".to_string(),
            allow_fallback_to_title: true,
            default_value: None,
        }
    }
}

/// Per-pattern overrides for the three destination templates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationOverrides {
    #[serde(default)]
    pub root_template: Option<String>,
    #[serde(default)]
    pub season_dir_template: Option<String>,
    #[serde(default)]
    pub filename_template: Option<String>,
}

/// A declarative pattern rule. Lower `priority` wins.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternConfig {
    pub regex: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub season_selector: SeasonSelector,
    #[serde(default)]
    pub episode_selector: EpisodeSelector,
    /// canonical session -> alias spellings, merged into the lookup index.
    #[serde(default)]
    pub session_aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub destination_overrides: Option<DestinationOverrides>,
}

fn default_priority() -> i32 {
    100
}

impl PatternConfig {
    /// Stable identifier used in processed records and traces.
    pub fn id(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.regex.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationTemplates {
    #[serde(default = "default_root_template")]
    pub root_template: String,
    #[serde(default = "default_season_template")]
    pub season_dir_template: String,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
}

fn default_root_template() -> String {
    "{show_title}".to_string()
}

fn default_season_template() -> String {
    "{season_number:02} {season_title}".to_string()
}

fn default_filename_template() -> String {
    "{show_title} - S{season_number:02}E{episode_number:02} - {episode_title}.{extension}"
        .to_string()
}

impl Default for DestinationTemplates {
    fn default() -> Self {
        Self {
            root_template: default_root_template(),
            season_dir_template: default_season_template(),
            filename_template: default_filename_template(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Randomization factor applied to each backoff interval (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_jitter() -> f64 {
    0.5
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_base_url() -> String {
    "https://api.tvsportsdb.com/api/v1".to_string()
}

fn default_ttl_hours() -> u64 {
    12
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ttl_hours: default_ttl_hours(),
            timeout_secs: default_timeout_secs(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_debounce")]
    pub debounce_seconds: f64,
    #[serde(default = "default_reconcile")]
    pub reconcile_interval: u64,
}

fn default_debounce() -> f64 {
    5.0
}

fn default_reconcile() -> u64 {
    900
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: Vec::new(),
            include: Vec::new(),
            ignore: Vec::new(),
            debounce_seconds: default_debounce(),
            reconcile_interval: default_reconcile(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationTarget {
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostRunSettings {
    /// Library-refresh webhook, invoked at most once per pass.
    #[serde(default)]
    pub refresh_url: Option<String>,
    #[serde(default)]
    pub notifications: Vec<NotificationTarget>,
}

/// A sport variant: shallow overrides expanded into an independent sport.
#[derive(Debug, Clone, Deserialize)]
pub struct SportVariant {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub id_suffix: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub show_ref: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub pattern_sets: Option<Vec<String>>,
    #[serde(default)]
    pub source_globs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SportEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub show_ref: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub source_globs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub source_extensions: Vec<String>,
    #[serde(default)]
    pub pattern_sets: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<PatternConfig>,
    #[serde(default)]
    pub allow_unmatched: bool,
    /// Name of a built-in team alias table (nhl, nba, premier_league, ...).
    #[serde(default)]
    pub team_alias_map: Option<String>,
    /// Extra canonical-team -> aliases entries merged over the built-ins.
    #[serde(default)]
    pub team_aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub link_mode: Option<LinkMode>,
    #[serde(default)]
    pub destination: Option<DestinationTemplates>,
    #[serde(default)]
    pub variants: Vec<SportVariant>,
}

fn default_extensions() -> Vec<String> {
    [".mkv", ".mp4", ".ts", ".m4v", ".avi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A fully resolved sport: variants expanded, pattern sets inlined and
/// sorted by priority.
#[derive(Debug, Clone)]
pub struct SportConfig {
    pub id: String,
    pub name: String,
    pub show_ref: String,
    pub enabled: bool,
    pub source_globs: Vec<String>,
    pub source_extensions: Vec<String>,
    pub patterns: Vec<PatternConfig>,
    pub allow_unmatched: bool,
    pub team_alias_map: Option<String>,
    pub team_aliases: HashMap<String, Vec<String>>,
    pub link_mode: Option<LinkMode>,
    pub destination: Option<DestinationTemplates>,
    /// Set for year variants; a captured `year` group that disagrees
    /// rejects the pattern match for this variant.
    pub variant_year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    source_dir: PathBuf,
    destination_dir: PathBuf,
    cache_dir: PathBuf,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_true")]
    skip_existing: bool,
    #[serde(default = "default_link_mode")]
    link_mode: LinkMode,
    #[serde(default)]
    fallback_to_copy: bool,
    #[serde(default)]
    destination: DestinationTemplates,
    #[serde(default)]
    metadata: MetadataSettings,
    #[serde(default)]
    watch: WatchSettings,
    #[serde(default)]
    post_run: PostRunSettings,
    #[serde(default)]
    pattern_sets: HashMap<String, Vec<PatternConfig>>,
    #[serde(default)]
    sports: Vec<SportEntry>,
}

fn default_link_mode() -> LinkMode {
    LinkMode::Hardlink
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub dry_run: bool,
    pub skip_existing: bool,
    pub reprocess: bool,
    pub trace: bool,
    pub link_mode: LinkMode,
    pub fallback_to_copy: bool,
    pub destination: DestinationTemplates,
    pub metadata: MetadataSettings,
    pub watch: WatchSettings,
    pub post_run: PostRunSettings,
    pub sports: Vec<SportConfig>,
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut sports = Vec::new();
        let mut seen_ids = HashSet::new();

        for entry in &raw.sports {
            for sport in expand_variants(entry, &raw.pattern_sets)? {
                if !seen_ids.insert(sport.id.clone()) {
                    return Err(ConfigError::DuplicateSportId(sport.id));
                }
                sports.push(sport);
            }
        }

        let config = Self {
            source_dir: raw.source_dir,
            destination_dir: raw.destination_dir,
            cache_dir: raw.cache_dir,
            dry_run: raw.dry_run,
            skip_existing: raw.skip_existing,
            reprocess: false,
            trace: false,
            link_mode: raw.link_mode,
            fallback_to_copy: raw.fallback_to_copy,
            destination: raw.destination,
            metadata: raw.metadata,
            watch: raw.watch,
            post_run: raw.post_run,
            sports,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig("source_dir must be set".into()));
        }
        if self.destination_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "destination_dir must be set".into(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig("cache_dir must be set".into()));
        }
        if self.watch.debounce_seconds < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "watch.debounce_seconds must be >= 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.metadata.retry.jitter) {
            return Err(ConfigError::InvalidConfig(
                "metadata.retry.jitter must be between 0 and 1".into(),
            ));
        }
        for sport in &self.sports {
            if sport.show_ref.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "sport '{}' is missing show_ref",
                    sport.id
                )));
            }
        }
        for target in &self.post_run.notifications {
            match target.kind.as_str() {
                "log" => {}
                "webhook" if target.url.is_some() => {}
                "webhook" => {
                    return Err(ConfigError::InvalidConfig(
                        "webhook notification target requires a url".into(),
                    ))
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown notification target kind '{other}'"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Overlay environment variables. File < env < flags.
    pub fn apply_env(&mut self) {
        if let Ok(value) = env::var("SIDELINE_SOURCE_DIR") {
            self.source_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SIDELINE_DESTINATION_DIR") {
            self.destination_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SIDELINE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(value);
        }
        if let Some(value) = env_bool("SIDELINE_DRY_RUN") {
            self.dry_run = value;
        }
        if let Ok(value) = env::var("SIDELINE_LINK_MODE") {
            if let Some(mode) = LinkMode::parse(&value) {
                self.link_mode = mode;
            }
        }
    }

    /// Effective link mode for a sport (sport override, else global).
    pub fn link_mode_for(&self, sport: &SportConfig) -> LinkMode {
        sport.link_mode.unwrap_or(self.link_mode)
    }

    /// Effective destination templates for a sport and matched pattern.
    pub fn templates_for(
        &self,
        sport: &SportConfig,
        overrides: Option<&DestinationOverrides>,
    ) -> DestinationTemplates {
        let base = sport.destination.clone().unwrap_or_else(|| self.destination.clone());
        match overrides {
            None => base,
            Some(over) => DestinationTemplates {
                root_template: over.root_template.clone().unwrap_or(base.root_template),
                season_dir_template: over
                    .season_dir_template
                    .clone()
                    .unwrap_or(base.season_dir_template),
                filename_template: over
                    .filename_template
                    .clone()
                    .unwrap_or(base.filename_template),
            },
        }
    }
}

/// Parse a boolean from an environment variable ("1"/"true"/"yes"/"on").
pub fn env_bool(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_patterns(
    entry_id: &str,
    set_refs: &[String],
    file_patterns: &[PatternConfig],
    pattern_sets: &HashMap<String, Vec<PatternConfig>>,
) -> Result<Vec<PatternConfig>, ConfigError> {
    let mut patterns = Vec::new();
    for set_name in set_refs {
        let set = pattern_sets
            .get(set_name)
            .ok_or_else(|| ConfigError::UnknownPatternSet {
                set: set_name.clone(),
                sport: entry_id.to_string(),
            })?;
        patterns.extend(set.iter().cloned());
    }
    patterns.extend(file_patterns.iter().cloned());
    // Lower priority wins; a stable sort keeps declaration order for ties.
    patterns.sort_by_key(|p| p.priority);
    Ok(patterns)
}

fn expand_variants(
    entry: &SportEntry,
    pattern_sets: &HashMap<String, Vec<PatternConfig>>,
) -> Result<Vec<SportConfig>, ConfigError> {
    let base_name = entry.name.clone().unwrap_or_else(|| entry.id.clone());

    if entry.variants.is_empty() {
        let patterns = resolve_patterns(
            &entry.id,
            &entry.pattern_sets,
            &entry.file_patterns,
            pattern_sets,
        )?;
        return Ok(vec![SportConfig {
            id: entry.id.clone(),
            name: base_name,
            show_ref: entry.show_ref.clone(),
            enabled: entry.enabled,
            source_globs: entry.source_globs.clone(),
            source_extensions: entry.source_extensions.clone(),
            patterns,
            allow_unmatched: entry.allow_unmatched,
            team_alias_map: entry.team_alias_map.clone(),
            team_aliases: entry.team_aliases.clone(),
            link_mode: entry.link_mode,
            destination: entry.destination.clone(),
            variant_year: None,
        }]);
    }

    let mut expanded = Vec::new();
    for variant in &entry.variants {
        let suffix = variant
            .id_suffix
            .clone()
            .or_else(|| variant.year.map(|y| y.to_string()));
        let id = match (&variant.id, &suffix) {
            (Some(id), _) => id.clone(),
            (None, Some(suffix)) => format!("{}_{}", entry.id, suffix),
            (None, None) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "variant of sport '{}' must define id, id_suffix, or year",
                    entry.id
                )))
            }
        };
        let name = variant.name.clone().unwrap_or_else(|| match variant.year {
            Some(year) => format!("{base_name} {year}"),
            None => match &suffix {
                Some(suffix) => format!("{base_name} {suffix}"),
                None => base_name.clone(),
            },
        });
        let set_refs = variant
            .pattern_sets
            .clone()
            .unwrap_or_else(|| entry.pattern_sets.clone());
        let patterns = resolve_patterns(&id, &set_refs, &entry.file_patterns, pattern_sets)?;

        expanded.push(SportConfig {
            id,
            name,
            show_ref: variant.show_ref.clone().unwrap_or_else(|| entry.show_ref.clone()),
            enabled: variant.enabled.unwrap_or(entry.enabled),
            source_globs: variant
                .source_globs
                .clone()
                .unwrap_or_else(|| entry.source_globs.clone()),
            source_extensions: entry.source_extensions.clone(),
            patterns,
            allow_unmatched: entry.allow_unmatched,
            team_alias_map: entry.team_alias_map.clone(),
            team_aliases: entry.team_aliases.clone(),
            link_mode: entry.link_mode,
            destination: entry.destination.clone(),
            variant_year: variant.year,
        });
    }
    Ok(expanded)
}
