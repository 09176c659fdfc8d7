//! Pass orchestration: discover, load metadata, match, link, report
//!
//! A pass runs in explicit stages. Metadata for all enabled sports loads
//! concurrently; discovered files are dispatched to a bounded worker pool
//! where each worker owns one file through match, destination build, and
//! link; cache mutations and notifications are applied by the orchestrator
//! as workers finish, and committed atomically at pass end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, SportConfig};
use crate::matcher::{self, CompiledPattern, MatchFailure};
use crate::metadata::{
    build_alias_lookup, compute_show_fingerprint, normalize_show, FingerprintStore,
    MetadataChange, MetadataProvider, MetadataStore,
};
use crate::models::{PassStats, ProcessedRecord, Show};
use crate::services::destination::{build_destination, build_match_context, DestinationError};
use crate::services::fingerprint;
use crate::services::linker::{LinkOutcome, Linker, Specificity};
use crate::services::notifications::{
    summary_event, NotificationEvent, NotificationService, RefreshTrigger,
};
use crate::services::processed_cache::ProcessedCache;
use crate::services::scanner;
use crate::services::trace::{FileTrace, TraceWriter};

/// Immutable per-pass state for one sport: configuration, normalized show,
/// compiled patterns, and the team alias lookup.
pub struct SportRuntime {
    pub sport: SportConfig,
    pub show: Show,
    pub patterns: Vec<CompiledPattern>,
    pub alias_lookup: HashMap<String, String>,
    pub metadata_fingerprint: String,
    pub stale_metadata: bool,
}

/// The processor with all collaborators injected at construction.
pub struct Processor {
    config: Arc<AppConfig>,
    provider: Arc<dyn MetadataProvider>,
    metadata_store: Arc<MetadataStore>,
    fingerprints: Mutex<FingerprintStore>,
    processed: Mutex<ProcessedCache>,
    notifications: tokio::sync::Mutex<NotificationService>,
    refresh_trigger: Option<Arc<dyn RefreshTrigger>>,
    linker: Arc<Linker>,
}

/// What one worker decided about one file.
enum FileOutcome {
    Linked {
        record: ProcessedRecord,
        replaced: bool,
        old_destination: Option<PathBuf>,
        event: NotificationEvent,
    },
    WouldLink {
        sport_id: String,
        destination: PathBuf,
    },
    AlreadyDone {
        record: ProcessedRecord,
        reason: &'static str,
    },
    SkippedExisting {
        record: ProcessedRecord,
        old_destination: Option<PathBuf>,
    },
    Ignored {
        sport_id: Option<String>,
        sample: bool,
    },
    Failed {
        sport_id: String,
        reason: String,
        detail: String,
    },
}

struct WorkerContext {
    config: Arc<AppConfig>,
    runtimes: Arc<Vec<Arc<SportRuntime>>>,
    linker: Arc<Linker>,
    /// destination -> (specificity, discovery index) claims for this pass.
    claims: Arc<Mutex<HashMap<PathBuf, (Specificity, usize)>>>,
    /// Per-destination locks so two workers never interleave their
    /// exists-check and rename on the same path.
    destination_locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
    /// Read-only snapshot of processed records keyed by source.
    records_by_source: Arc<HashMap<PathBuf, ProcessedRecord>>,
    /// Read-only snapshot keyed by destination, for overwrite decisions.
    records_by_destination: Arc<HashMap<PathBuf, Specificity>>,
    trace: Arc<TraceWriter>,
    cancel: CancellationToken,
}

impl Processor {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn MetadataProvider>,
        refresh_trigger: Option<Arc<dyn RefreshTrigger>>,
    ) -> Self {
        let ttl = std::time::Duration::from_secs(config.metadata.ttl_hours * 3600);
        let metadata_store = Arc::new(MetadataStore::new(
            &config.cache_dir,
            ttl,
            &config.metadata.base_url,
        ));
        let fingerprints = Mutex::new(FingerprintStore::load(&config.cache_dir));
        let processed = Mutex::new(ProcessedCache::load(&config.cache_dir));
        let notifications =
            tokio::sync::Mutex::new(NotificationService::from_settings(&config.post_run));
        let linker = Arc::new(Linker::new(config.fallback_to_copy));
        Self {
            config,
            provider,
            metadata_store,
            fingerprints,
            processed,
            notifications,
            refresh_trigger,
            linker,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Drop every processed record; the next pass rebuilds from scratch.
    pub fn clear_processed_cache(&self) -> anyhow::Result<()> {
        let mut cache = self.processed.lock();
        cache.clear();
        cache.save()
    }

    /// Execute one full pass.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> PassStats {
        let pass_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        let mut stats = PassStats::default();
        info!(pass_id = %pass_id, dry_run = self.config.dry_run, "Starting pass");

        // Stage 1+2 overlap: metadata loads while discovery walks disk.
        let runtimes = self.load_sports(&mut stats).await;
        if cancel.is_cancelled() {
            return stats;
        }

        // Metadata changes invalidate matching processed records; their old
        // destinations are cleaned up once the source relinks.
        let stale_records = self.invalidate_changed_sports(&runtimes);

        let source_dir = self.config.source_dir.clone();
        let files = tokio::task::spawn_blocking(move || scanner::gather_source_files(&source_dir))
            .await
            .unwrap_or_default();
        debug!(pass_id = %pass_id, files = files.len(), "Discovery complete");

        let trace = Arc::new(TraceWriter::new(
            &self.config.cache_dir,
            &pass_id,
            self.config.trace,
        ));

        // Snapshots for the workers; the live cache is only mutated by the
        // orchestrator below.
        let (records_by_source, records_by_destination) = {
            let cache = self.processed.lock();
            let mut by_source = HashMap::new();
            let mut by_destination = HashMap::new();
            for path in &files {
                if let Some(record) = cache.get(path) {
                    by_source.insert(path.clone(), record.clone());
                }
            }
            // Every known record contributes its destination's specificity,
            // including records whose source was not discovered this pass.
            for record in stale_records.values().chain(cache.iter()) {
                by_destination.insert(
                    record.destination_path.clone(),
                    Specificity {
                        pattern_priority: record.pattern_priority,
                        session_exact: record.session_exact,
                    },
                );
            }
            (Arc::new(by_source), Arc::new(by_destination))
        };

        let context = Arc::new(WorkerContext {
            config: self.config.clone(),
            runtimes: Arc::new(runtimes.into_iter().map(Arc::new).collect()),
            linker: self.linker.clone(),
            claims: Arc::new(Mutex::new(HashMap::new())),
            destination_locks: Arc::new(Mutex::new(HashMap::new())),
            records_by_source,
            records_by_destination,
            trace,
            cancel: cancel.clone(),
        });

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut outcome_stream = stream::iter(files.into_iter().enumerate().map(|(index, path)| {
            let context = context.clone();
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                if context.cancel.is_cancelled() {
                    return None;
                }
                Some(process_single_file(context, index, path).await)
            }
        }))
        .buffer_unordered(workers * 2);

        let mut new_links: u64 = 0;
        while let Some(result) = outcome_stream.next().await {
            let Some((path, outcome)) = result else {
                continue;
            };
            self.apply_outcome(&path, outcome, &stale_records, &mut stats, &mut new_links)
                .await;
        }
        drop(outcome_stream);

        // Stage 4: post-run.
        self.post_run(&pass_id, &mut stats, new_links).await;

        let elapsed = started.elapsed();
        info!(
            pass_id = %pass_id,
            processed = stats.processed,
            skipped = stats.skipped,
            ignored = stats.ignored,
            failed = stats.failed,
            duration_ms = elapsed.as_millis() as u64,
            "Pass complete"
        );
        stats
    }

    /// Fetch, normalize, and compile every enabled sport concurrently.
    /// Failures skip that sport and leave the rest untouched.
    async fn load_sports(&self, stats: &mut PassStats) -> Vec<SportRuntime> {
        let enabled: Vec<&SportConfig> =
            self.config.sports.iter().filter(|s| s.enabled).collect();
        for sport in self.config.sports.iter().filter(|s| !s.enabled) {
            debug!(sport = %sport.id, "Skipping disabled sport");
        }

        let loads = enabled.iter().enumerate().map(|(index, sport)| {
            let store = self.metadata_store.clone();
            let provider = self.provider.clone();
            async move {
                let served = store.get(&sport.show_ref, provider.as_ref()).await;
                (index, *sport, served)
            }
        });
        let mut results: Vec<_> = stream::iter(loads)
            .buffer_unordered(8.min(enabled.len().max(1)))
            .collect()
            .await;
        // Loads complete in arbitrary order; sport precedence during
        // matching follows configuration order.
        results.sort_by_key(|(index, _, _)| *index);

        let mut runtimes = Vec::new();
        for (_, sport, served) in results {
            let served = match served {
                Ok(served) => served,
                Err(err) => {
                    warn!(sport = %sport.id, error = %err, "Metadata unavailable, skipping sport");
                    stats.register_warning(format!(
                        "{}: metadata unavailable: {err}",
                        sport.id
                    ));
                    stats.sports_skipped.push(sport.id.clone());
                    continue;
                }
            };
            if served.stale {
                stats.register_warning(format!("{}: using stale metadata", sport.id));
            }

            let show = normalize_show(&served.raw, sport);
            let patterns = match matcher::compile_patterns(sport, &show) {
                Ok(patterns) => patterns,
                Err(err) => {
                    error!(sport = %sport.id, error = %err, "Pattern compilation failed, skipping sport");
                    stats.register_warning(format!("{}: {err}", sport.id));
                    stats.sports_skipped.push(sport.id.clone());
                    continue;
                }
            };
            let alias_lookup = build_alias_lookup(&show, sport);

            runtimes.push(SportRuntime {
                sport: sport.clone(),
                show,
                patterns,
                alias_lookup,
                metadata_fingerprint: served.payload_digest,
                stale_metadata: served.stale,
            });
        }
        runtimes
    }

    fn invalidate_changed_sports(
        &self,
        runtimes: &[SportRuntime],
    ) -> HashMap<PathBuf, ProcessedRecord> {
        let mut changes: HashMap<String, MetadataChange> = HashMap::new();
        {
            let mut fingerprints = self.fingerprints.lock();
            for runtime in runtimes {
                let fingerprint =
                    compute_show_fingerprint(&runtime.show, &runtime.sport.show_ref);
                let change = fingerprints.update(&runtime.sport.id, fingerprint);
                if change.updated {
                    info!(sport = %runtime.sport.id, "Metadata updated since last pass");
                    changes.insert(runtime.sport.id.clone(), change);
                }
            }
        }
        if changes.is_empty() {
            return HashMap::new();
        }
        self.processed.lock().remove_by_metadata_changes(&changes)
    }

    /// Apply one worker outcome: tallies, cache updates, notifications, and
    /// stale-destination cleanup. Runs only on the orchestrator.
    async fn apply_outcome(
        &self,
        path: &Path,
        outcome: FileOutcome,
        stale_records: &HashMap<PathBuf, ProcessedRecord>,
        stats: &mut PassStats,
        new_links: &mut u64,
    ) {
        match outcome {
            FileOutcome::Linked {
                record,
                replaced,
                old_destination,
                event,
            } => {
                stats.register_processed(&record.sport_id);
                stats.destinations.push(record.destination_path.clone());
                *new_links += 1;
                let stale_destination = stale_records
                    .get(path)
                    .map(|r| r.destination_path.clone())
                    .filter(|old| old != &record.destination_path);
                self.processed.lock().mark_processed(record);
                self.notifications.lock().await.queue(event);
                for old in [old_destination, stale_destination].into_iter().flatten() {
                    self.remove_obsolete_destination(&old).await;
                }
                if replaced {
                    debug!(source = %path.display(), "Destination replaced by higher-specificity match");
                }
            }
            FileOutcome::WouldLink {
                sport_id,
                destination,
            } => {
                stats.register_processed(&sport_id);
                stats.destinations.push(destination);
            }
            FileOutcome::AlreadyDone { record, reason } => {
                stats.register_skipped(&record.sport_id, reason);
                self.processed.lock().mark_processed(record);
            }
            FileOutcome::SkippedExisting {
                record,
                old_destination,
            } => {
                stats.register_skipped(&record.sport_id, "destination-exists");
                self.processed.lock().mark_processed(record);
                if let Some(old) = old_destination {
                    self.remove_obsolete_destination(&old).await;
                }
            }
            FileOutcome::Ignored { sport_id, sample } => {
                if sample {
                    debug!(source = %path.display(), "Suppressing sample file");
                }
                stats.register_ignored(sport_id.as_deref());
            }
            FileOutcome::Failed {
                sport_id,
                reason,
                detail,
            } => {
                stats.register_failed(&sport_id, &reason, detail);
            }
        }
    }

    async fn remove_obsolete_destination(&self, old: &Path) {
        match tokio::fs::remove_file(old).await {
            Ok(()) => debug!(path = %old.display(), "Removed obsolete destination"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %old.display(), error = %err, "Failed to remove obsolete destination")
            }
        }
    }

    async fn post_run(&self, pass_id: &str, stats: &mut PassStats, new_links: u64) {
        if new_links > 0 && !self.config.dry_run {
            if let Some(trigger) = &self.refresh_trigger {
                let event = NotificationEvent::RefreshRequested {
                    pass_id: pass_id.to_string(),
                    new_links,
                };
                trigger.trigger(&event).await;
            }
        }

        let mut notifications = self.notifications.lock().await;
        notifications.queue(summary_event(pass_id, stats, self.config.dry_run));
        notifications.flush().await;
        drop(notifications);

        if !self.config.dry_run {
            if let Err(err) = self.processed.lock().save() {
                error!(error = %err, "Failed to commit processed cache");
                stats.register_warning(format!("processed cache commit failed: {err}"));
            }
            if let Err(err) = self.fingerprints.lock().save() {
                warn!(error = %err, "Failed to persist metadata fingerprints");
            }
        }
    }
}

/// Match, build, and link a single file. Runs on the worker pool.
async fn process_single_file(
    context: Arc<WorkerContext>,
    discovery_index: usize,
    path: PathBuf,
) -> (PathBuf, FileOutcome) {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let is_sample = scanner::is_sample_file(&path);
    let mut trace = FileTrace::new(&filename);

    let mut last_failure: Option<(String, MatchFailure)> = None;
    let mut any_extension_matched = false;

    for runtime in context.runtimes.iter() {
        if !scanner::matches_extension(&path, &runtime.sport) {
            continue;
        }
        any_extension_matched = true;

        if !scanner::matches_globs(&path, &runtime.sport) {
            last_failure = Some((runtime.sport.id.clone(), MatchFailure::IgnoredByFilter));
            continue;
        }

        match matcher::match_file(
            &filename,
            &runtime.sport,
            &runtime.show,
            &runtime.patterns,
            &runtime.alias_lookup,
        ) {
            Ok(outcome) => {
                trace.sport_id = Some(runtime.sport.id.clone());
                trace.pattern_id = Some(outcome.pattern_id.clone());
                trace.groups = outcome.groups.clone();
                let resolved =
                    link_matched_file(&context, runtime, &path, outcome, discovery_index).await;
                match &resolved {
                    FileOutcome::Linked { record, .. } => {
                        trace.status = "linked".into();
                        trace.destination = Some(record.destination_path.clone());
                    }
                    FileOutcome::WouldLink { destination, .. } => {
                        trace.status = "dry-run".into();
                        trace.destination = Some(destination.clone());
                    }
                    FileOutcome::AlreadyDone { reason, .. } => {
                        trace.status = (*reason).to_string();
                    }
                    FileOutcome::SkippedExisting { .. } => trace.status = "skipped".into(),
                    FileOutcome::Failed { reason, .. } => {
                        trace.status = "failed".into();
                        trace.reason = Some(reason.clone());
                    }
                    FileOutcome::Ignored { .. } => trace.status = "ignored".into(),
                }
                context.trace.persist(&trace);
                return (path, resolved);
            }
            Err(failure) => {
                debug!(
                    source = %filename,
                    sport = %runtime.sport.id,
                    reason = failure.code(),
                    "No match for sport"
                );
                last_failure = Some((runtime.sport.id.clone(), failure));
            }
        }
    }

    trace.status = "ignored".into();
    let outcome = match last_failure {
        // A real matching failure (season or episode resolution) on a
        // non-sample file is reported; plain no-match is just ignored.
        Some((sport_id, failure)) if !is_sample => {
            trace.sport_id = Some(sport_id.clone());
            trace.reason = Some(failure.code().to_string());
            match failure {
                MatchFailure::SeasonNotFound
                | MatchFailure::EpisodeNotFound
                | MatchFailure::Ambiguous => {
                    if runtime_allows_unmatched(&context, &sport_id) {
                        FileOutcome::Ignored {
                            sport_id: Some(sport_id),
                            sample: false,
                        }
                    } else {
                        FileOutcome::Failed {
                            sport_id,
                            reason: failure.code().to_string(),
                            detail: format!("{filename}: {failure}"),
                        }
                    }
                }
                _ => FileOutcome::Ignored {
                    sport_id: Some(sport_id),
                    sample: false,
                },
            }
        }
        Some((sport_id, _)) => FileOutcome::Ignored {
            sport_id: Some(sport_id),
            sample: true,
        },
        None => {
            if !any_extension_matched {
                debug!(source = %filename, "No configured sport accepts this extension");
            }
            FileOutcome::Ignored {
                sport_id: None,
                sample: is_sample,
            }
        }
    };
    context.trace.persist(&trace);
    (path, outcome)
}

fn runtime_allows_unmatched(context: &WorkerContext, sport_id: &str) -> bool {
    context
        .runtimes
        .iter()
        .find(|r| r.sport.id == sport_id)
        .map(|r| r.sport.allow_unmatched)
        .unwrap_or(false)
}

/// Build the destination for a successful match and materialize it.
async fn link_matched_file(
    context: &WorkerContext,
    runtime: &SportRuntime,
    path: &Path,
    outcome: matcher::MatchOutcome,
    discovery_index: usize,
) -> FileOutcome {
    let sport = &runtime.sport;
    let Some(season) = runtime.show.season_by_number(outcome.season_number) else {
        return FileOutcome::Failed {
            sport_id: sport.id.clone(),
            reason: MatchFailure::SeasonNotFound.code().to_string(),
            detail: format!("{}: matched season vanished", path.display()),
        };
    };
    let Some(episode) = season.episode_by_number(outcome.episode_number) else {
        return FileOutcome::Failed {
            sport_id: sport.id.clone(),
            reason: MatchFailure::EpisodeNotFound.code().to_string(),
            detail: format!("{}: matched episode vanished", path.display()),
        };
    };

    let template_context = build_match_context(
        &sport.id,
        &sport.name,
        &runtime.show,
        season,
        episode,
        path,
        &context.config.source_dir,
        &outcome.groups,
    );
    let templates = context
        .config
        .templates_for(sport, outcome.destination_overrides.as_ref());
    let destination = match build_destination(
        &context.config.destination_dir,
        &templates,
        &template_context,
    ) {
        Ok(destination) => destination,
        Err(err) => {
            let reason = match &err {
                DestinationError::Template(_) => "template-error",
                DestinationError::UnsafePath(_) => "unsafe-path",
                DestinationError::NameTooLong(_) => "name-too-long",
            };
            error!(source = %path.display(), error = %err, "Destination build failed");
            return FileOutcome::Failed {
                sport_id: sport.id.clone(),
                reason: reason.to_string(),
                detail: format!("{}: {err}", path.display()),
            };
        }
    };

    let incoming = Specificity {
        pattern_priority: outcome.pattern_priority,
        session_exact: outcome.session_exact,
    };

    // Intra-pass destination claims: the better (priority, discovery
    // order) claim wins deterministically regardless of worker timing.
    let displaced_claim = {
        let mut claims = context.claims.lock();
        match claims.get(&destination) {
            Some((existing, existing_index)) => {
                let existing = *existing;
                let incoming_wins = incoming.beats(&existing)
                    || (!existing.beats(&incoming)
                        && incoming.pattern_priority == existing.pattern_priority
                        && discovery_index < *existing_index);
                if incoming_wins {
                    claims.insert(destination.clone(), (incoming, discovery_index));
                    // A tie broken purely by discovery order must still
                    // displace whatever the losing claim already linked.
                    if incoming.beats(&existing) {
                        Some(existing)
                    } else {
                        Some(Specificity {
                            pattern_priority: i32::MAX,
                            session_exact: false,
                        })
                    }
                } else {
                    return FileOutcome::Failed {
                        sport_id: sport.id.clone(),
                        reason: "destination-conflict".to_string(),
                        detail: format!(
                            "{}: destination {} already claimed this pass",
                            path.display(),
                            destination.display()
                        ),
                    };
                }
            }
            None => {
                claims.insert(destination.clone(), (incoming, discovery_index));
                None
            }
        }
    };

    let file_fingerprint = match fingerprint::digest_file(path).await {
        Ok(digest) => digest,
        Err(err) => {
            return FileOutcome::Failed {
                sport_id: sport.id.clone(),
                reason: "source-vanished".to_string(),
                detail: format!("{}: {err}", path.display()),
            };
        }
    };

    let record = ProcessedRecord {
        source_fingerprint: file_fingerprint.clone(),
        source_path: path.to_path_buf(),
        destination_path: destination.clone(),
        link_mode: context.config.link_mode_for(sport).as_str().to_string(),
        pattern_id: outcome.pattern_id.clone(),
        pattern_priority: outcome.pattern_priority,
        session_exact: outcome.session_exact,
        sport_id: sport.id.clone(),
        created_at: Utc::now(),
    };

    // Idempotence: same fingerprint, same destination, destination still in
    // place -> nothing to do.
    if !context.config.reprocess {
        if let Some(previous) = context.records_by_source.get(path) {
            if previous.source_fingerprint == file_fingerprint
                && previous.destination_path == destination
                && tokio::fs::symlink_metadata(&destination).await.is_ok()
            {
                return FileOutcome::AlreadyDone {
                    record,
                    reason: "already-processed",
                };
            }
        }
    }

    if context.config.dry_run {
        info!(
            source = %path.display(),
            destination = %destination.display(),
            "Dry-run: would link"
        );
        return FileOutcome::WouldLink {
            sport_id: sport.id.clone(),
            destination,
        };
    }

    // Existing-destination specificity comes from the processed records,
    // or from the intra-pass claim this match just displaced; with
    // skip_existing disabled any differing content is replaced.
    let existing_specificity = if context.config.skip_existing {
        displaced_claim.or_else(|| context.records_by_destination.get(&destination).copied())
    } else {
        Some(Specificity {
            pattern_priority: i32::MAX,
            session_exact: false,
        })
    };

    let mode = context.config.link_mode_for(sport);
    let old_destination = context
        .records_by_source
        .get(path)
        .map(|r| r.destination_path.clone())
        .filter(|old| old != &destination);

    let destination_lock = {
        let mut locks = context.destination_locks.lock();
        locks
            .entry(destination.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    };
    let _destination_guard = destination_lock.lock().await;

    match context
        .linker
        .link(path, &destination, mode, incoming, existing_specificity)
        .await
    {
        Ok(result @ (LinkOutcome::Created | LinkOutcome::Replaced)) => {
            let replaced = result == LinkOutcome::Replaced;
            let event = NotificationEvent::PerFileLinked {
                sport_id: sport.id.clone(),
                sport_name: sport.name.clone(),
                show_title: runtime.show.title.clone(),
                season_title: season.title.clone(),
                episode_title: episode.title.clone(),
                destination: destination.clone(),
                source: path.to_path_buf(),
                link_mode: mode.as_str().to_string(),
                replaced,
            };
            FileOutcome::Linked {
                record,
                replaced,
                old_destination,
                event,
            }
        }
        Ok(LinkOutcome::AlreadyLinked) => FileOutcome::AlreadyDone {
            record,
            reason: "destination-up-to-date",
        },
        Ok(LinkOutcome::SkippedExisting) => FileOutcome::SkippedExisting {
            record,
            old_destination,
        },
        Err(err) => {
            let reason = match &err {
                crate::services::linker::LinkError::DestinationConflict(_) => {
                    "destination-conflict"
                }
                crate::services::linker::LinkError::CrossDeviceLink(_) => "cross-device-link",
                crate::services::linker::LinkError::PermissionDenied(_) => "permission-denied",
                crate::services::linker::LinkError::SourceVanished(_) => "source-vanished",
                crate::services::linker::LinkError::Other(_) => "link-failed",
            };
            error!(source = %path.display(), error = %err, "Link failed");
            FileOutcome::Failed {
                sport_id: sport.id.clone(),
                reason: reason.to_string(),
                detail: format!("{}: {err}", path.display()),
            }
        }
    }
}
