//! Notification sinks and the library-refresh trigger
//!
//! The core emits three event kinds (per-file link, pass summary, refresh
//! request) through a narrow sink interface and never depends on delivery
//! semantics. Events are queued during a pass and dispatched together at
//! pass end.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{NotificationTarget, PostRunSettings};
use crate::models::PassStats;

/// An event emitted by the processor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    PerFileLinked {
        sport_id: String,
        sport_name: String,
        show_title: String,
        season_title: String,
        episode_title: String,
        destination: PathBuf,
        source: PathBuf,
        link_mode: String,
        replaced: bool,
    },
    PassSummary {
        pass_id: String,
        processed: u64,
        skipped: u64,
        ignored: u64,
        failed: u64,
        skipped_reasons: HashMap<String, u64>,
        failed_reasons: HashMap<String, u64>,
        dry_run: bool,
    },
    RefreshRequested {
        pass_id: String,
        new_links: u64,
    },
}

/// Delivery interface; implementations own their transport entirely.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, event: &NotificationEvent);
}

/// Library-refresh hook, invoked at most once per pass.
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn trigger(&self, summary: &NotificationEvent);
}

/// Sink that logs events through tracing.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn emit(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::PerFileLinked {
                sport_id,
                destination,
                link_mode,
                replaced,
                ..
            } => {
                info!(
                    sport = %sport_id,
                    destination = %destination.display(),
                    link_mode = %link_mode,
                    replaced,
                    "Linked"
                );
            }
            NotificationEvent::PassSummary {
                processed,
                skipped,
                ignored,
                failed,
                dry_run,
                ..
            } => {
                info!(processed, skipped, ignored, failed, dry_run, "Pass summary");
            }
            NotificationEvent::RefreshRequested { new_links, .. } => {
                info!(new_links, "Library refresh requested");
            }
        }
    }
}

/// Sink that POSTs each event as JSON to a webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn emit(&self, event: &NotificationEvent) {
        match self.client.post(&self.url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %self.url, "Notification delivered");
            }
            Ok(response) => {
                warn!(url = %self.url, status = %response.status(), "Notification rejected");
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "Notification delivery failed");
            }
        }
    }
}

/// Webhook-backed refresh trigger.
pub struct WebhookRefreshTrigger {
    sink: WebhookSink,
}

impl WebhookRefreshTrigger {
    pub fn new(url: String) -> Self {
        Self {
            sink: WebhookSink::new(url),
        }
    }
}

#[async_trait]
impl RefreshTrigger for WebhookRefreshTrigger {
    async fn trigger(&self, summary: &NotificationEvent) {
        self.sink.emit(summary).await;
    }
}

/// Queues events during a pass and flushes them to every sink at pass end.
pub struct NotificationService {
    sinks: Vec<Box<dyn NotificationSink>>,
    queued: Vec<NotificationEvent>,
}

impl NotificationService {
    pub fn from_settings(settings: &PostRunSettings) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        for target in &settings.notifications {
            match build_sink(target) {
                Some(sink) => sinks.push(sink),
                None => warn!(kind = %target.kind, "Ignoring unusable notification target"),
            }
        }
        Self {
            sinks,
            queued: Vec::new(),
        }
    }

    pub fn queue(&mut self, event: NotificationEvent) {
        if !self.sinks.is_empty() {
            self.queued.push(event);
        }
    }

    /// Deliver everything queued this pass, in order.
    pub async fn flush(&mut self) {
        let events = std::mem::take(&mut self.queued);
        for event in &events {
            for sink in &self.sinks {
                sink.emit(event).await;
            }
        }
    }
}

fn build_sink(target: &NotificationTarget) -> Option<Box<dyn NotificationSink>> {
    match target.kind.as_str() {
        "log" => Some(Box::new(LogSink)),
        "webhook" => target
            .url
            .clone()
            .map(|url| Box::new(WebhookSink::new(url)) as Box<dyn NotificationSink>),
        _ => None,
    }
}

/// Build the pass-summary event from the tallied stats.
pub fn summary_event(pass_id: &str, stats: &PassStats, dry_run: bool) -> NotificationEvent {
    NotificationEvent::PassSummary {
        pass_id: pass_id.to_string(),
        processed: stats.processed,
        skipped: stats.skipped,
        ignored: stats.ignored,
        failed: stats.failed,
        skipped_reasons: stats.skipped_reasons.clone(),
        failed_reasons: stats.failed_reasons.clone(),
        dry_run,
    }
}
