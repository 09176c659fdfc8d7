//! Filesystem watcher with debouncing and periodic reconciliation
//!
//! notify's platform watcher feeds a coalescing tokio channel; the watch
//! loop owns the debounce and reconcile timers. A pass triggers after
//! `debounce_seconds` of quiet, and unconditionally every
//! `reconcile_interval` seconds to recover from dropped notifications.
//! Events generated by the pass itself are suppressed and drained.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchSettings;
use crate::services::processor::Processor;
use crate::services::scanner::glob_match;

/// Bridges notify callbacks onto a tokio channel, applying the include and
/// ignore glob filters before dispatch.
pub struct WatchBridge {
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<PathBuf>,
    suppressed: Arc<AtomicBool>,
}

impl WatchBridge {
    pub fn new(roots: &[PathBuf], settings: &WatchSettings) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let suppressed = Arc::new(AtomicBool::new(false));
        let include = settings.include.clone();
        let ignore = settings.ignore.clone();
        let suppressed_flag = suppressed.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if suppressed_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if event_matches(&path, &include, &ignore) {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(err) => error!(error = %err, "Filesystem watch error"),
            },
            notify::Config::default(),
        )?;

        for root in roots {
            std::fs::create_dir_all(root).ok();
            watcher.watch(root, RecursiveMode::Recursive)?;
            info!(path = %root.display(), "Watching");
        }

        Ok(Self {
            watcher,
            events: rx,
            suppressed,
        })
    }

    /// Split into the pieces the debounce loop needs; the watcher handle
    /// must stay alive for events to keep flowing.
    pub fn split(
        self,
    ) -> (
        RecommendedWatcher,
        mpsc::UnboundedReceiver<PathBuf>,
        Arc<AtomicBool>,
    ) {
        (self.watcher, self.events, self.suppressed)
    }
}

fn event_matches(path: &Path, include: &[String], ignore: &[String]) -> bool {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let full = path.to_string_lossy();
    if !include.is_empty()
        && !include
            .iter()
            .any(|p| glob_match(p, &filename) || glob_match(p, &full))
    {
        return false;
    }
    if ignore
        .iter()
        .any(|p| glob_match(p, &filename) || glob_match(p, &full))
    {
        return false;
    }
    true
}

/// Resolve the watch roots: configured paths (relative ones anchored at the
/// source dir), defaulting to the source dir itself.
pub fn resolve_roots(settings: &WatchSettings, source_dir: &Path) -> Vec<PathBuf> {
    if settings.paths.is_empty() {
        return vec![source_dir.to_path_buf()];
    }
    settings
        .paths
        .iter()
        .map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                source_dir.join(p)
            }
        })
        .collect()
}

/// Run passes forever: debounced on events, forced on the reconcile tick,
/// until cancelled.
pub async fn run_watch_loop(
    processor: Arc<Processor>,
    settings: WatchSettings,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let roots = resolve_roots(&settings, &processor.config().source_dir);
    let bridge = WatchBridge::new(&roots, &settings)?;
    let (_watcher, mut events, suppressed) = bridge.split();
    let debounce = Duration::from_secs_f64(settings.debounce_seconds.max(0.0));
    let reconcile = (settings.reconcile_interval > 0)
        .then(|| Duration::from_secs(settings.reconcile_interval));

    let pass_cancel = cancel.clone();
    run_debounce_loop(
        &mut events,
        Some(suppressed),
        debounce,
        reconcile,
        cancel,
        move |changes| {
            let processor = processor.clone();
            let pass_cancel = pass_cancel.clone();
            async move {
                let stats = processor.run_pass(&pass_cancel).await;
                debug!(
                    changes,
                    processed = stats.processed,
                    failed = stats.failed,
                    "Watch-triggered pass finished"
                );
            }
        },
    )
    .await;
    Ok(())
}

/// The timer core, factored from the notify plumbing so tests can drive it
/// with injected events and paused time.
///
/// Collects event paths; after `debounce` of quiet since the last event,
/// invokes `run_pass` once for the whole batch. New events during the quiet
/// window reset the timer. `reconcile` forces a pass on its interval even
/// without events. Cancellation stops both timers immediately.
pub async fn run_debounce_loop<F, Fut>(
    events: &mut mpsc::UnboundedReceiver<PathBuf>,
    suppress: Option<Arc<AtomicBool>>,
    debounce: Duration,
    reconcile: Option<Duration>,
    cancel: CancellationToken,
    mut run_pass: F,
) where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut pending: Vec<PathBuf> = Vec::new();
    let mut deadline: Option<tokio::time::Instant> = None;
    let far_future = Duration::from_secs(86_400 * 365);
    let mut reconcile_timer = tokio::time::interval(reconcile.unwrap_or(far_future));
    // interval's first tick fires immediately; swallow it.
    reconcile_timer.tick().await;

    loop {
        let sleep_until = deadline.unwrap_or_else(|| tokio::time::Instant::now() + far_future);
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Watch loop cancelled");
                return;
            }
            maybe_path = events.recv() => {
                match maybe_path {
                    Some(path) => {
                        debug!(path = %path.display(), "Filesystem change observed");
                        pending.push(path);
                        // Quiet-window reset.
                        deadline = Some(tokio::time::Instant::now() + debounce);
                    }
                    None => {
                        warn!("Watch event channel closed");
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                let changes = pending.len();
                info!(changes, "Debounce window elapsed, running pass");
                pending.clear();
                deadline = None;
                guarded_pass(&mut run_pass, changes, &suppress, events).await;
            }
            _ = reconcile_timer.tick(), if reconcile.is_some() => {
                debug!("Reconcile interval elapsed, running full pass");
                guarded_pass(&mut run_pass, pending.len(), &suppress, events).await;
            }
        }
    }
}

/// Run one pass with self-trigger suppression: events raised while the pass
/// scans the tree are dropped, and stragglers are drained afterwards.
async fn guarded_pass<F, Fut>(
    run_pass: &mut F,
    changes: usize,
    suppress: &Option<Arc<AtomicBool>>,
    events: &mut mpsc::UnboundedReceiver<PathBuf>,
) where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if let Some(flag) = suppress {
        flag.store(true, Ordering::Relaxed);
    }
    run_pass(changes).await;
    if let Some(flag) = suppress {
        flag.store(false, Ordering::Relaxed);
        let mut drained = 0usize;
        while events.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "Drained self-triggered filesystem events");
        }
    }
}
