//! Content-addressed on-disk metadata cache
//!
//! Each request is reduced to a stable fingerprint over the show reference
//! and backend URL; entries live at `cache_dir/metadata/<fingerprint>` as
//! JSON. Serve order: fresh from disk, else fetch-and-replace, else accept
//! a stale entry with a flag, else `MetadataUnavailable`. Writes go to a
//! sibling temp file and are renamed into place so readers never observe a
//! torn entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{MetadataProvider, ProviderError};
use crate::models::RawShow;
use crate::services::fingerprint::{digest_bytes, digest_text};

#[derive(Debug, Error)]
pub enum MetadataStoreError {
    #[error("metadata unavailable for '{show_ref}': {reason}")]
    Unavailable { show_ref: String, reason: String },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    fetched_at: DateTime<Utc>,
    payload_digest: String,
    payload: serde_json::Value,
}

/// A served metadata document, flagged when it came from an expired entry.
#[derive(Debug, Clone)]
pub struct ServedMetadata {
    pub raw: RawShow,
    pub payload_digest: String,
    pub stale: bool,
}

pub struct MetadataStore {
    dir: PathBuf,
    ttl: Duration,
    /// Mixed into the request fingerprint so switching backends never
    /// serves another backend's payloads.
    backend_key: String,
}

impl MetadataStore {
    pub fn new(cache_dir: &Path, ttl: Duration, backend_key: &str) -> Self {
        Self {
            dir: cache_dir.join("metadata"),
            ttl,
            backend_key: backend_key.to_string(),
        }
    }

    /// Stable request fingerprint for a show reference.
    pub fn request_fingerprint(&self, show_ref: &str) -> String {
        digest_text(&format!("{}\n{}", self.backend_key, show_ref))
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(fingerprint)
    }

    /// Serve metadata for a show: fresh cache, then network, then stale.
    pub async fn get(
        &self,
        show_ref: &str,
        provider: &dyn MetadataProvider,
    ) -> Result<ServedMetadata, MetadataStoreError> {
        let fingerprint = self.request_fingerprint(show_ref);
        let cached = self.read_entry(&fingerprint).await;

        if let Some(entry) = &cached {
            let age = Utc::now() - entry.fetched_at;
            if age.to_std().map(|age| age < self.ttl).unwrap_or(false) {
                if let Some(served) = self.decode_entry(entry, false) {
                    debug!(show_ref, "Serving fresh cached metadata");
                    return Ok(served);
                }
            }
        }

        match provider.fetch(show_ref).await {
            Ok(fetched) => {
                let payload: serde_json::Value = serde_json::from_slice(&fetched.payload)
                    .unwrap_or(serde_json::Value::Null);
                // Digest the canonical compact serialization, which is what
                // a later read will re-digest.
                let payload_digest = payload_canonical_digest(&payload);
                let entry = CacheEntry {
                    fingerprint: fingerprint.clone(),
                    fetched_at: Utc::now(),
                    payload_digest,
                    payload,
                };
                if let Err(err) = self.write_entry(&entry).await {
                    warn!(show_ref, error = %err, "Failed to persist metadata cache entry");
                }
                Ok(ServedMetadata {
                    raw: fetched.raw,
                    payload_digest: entry.payload_digest,
                    stale: false,
                })
            }
            Err(err) => self.serve_stale(show_ref, cached, err),
        }
    }

    fn serve_stale(
        &self,
        show_ref: &str,
        cached: Option<CacheEntry>,
        err: ProviderError,
    ) -> Result<ServedMetadata, MetadataStoreError> {
        if let Some(entry) = cached {
            if let Some(served) = self.decode_entry(&entry, true) {
                warn!(
                    show_ref,
                    error = %err,
                    fetched_at = %entry.fetched_at,
                    "Metadata fetch failed, serving stale cache entry"
                );
                return Ok(served);
            }
        }
        Err(MetadataStoreError::Unavailable {
            show_ref: show_ref.to_string(),
            reason: err.to_string(),
        })
    }

    fn decode_entry(&self, entry: &CacheEntry, stale: bool) -> Option<ServedMetadata> {
        // A digest mismatch means the entry was corrupted on disk; treat
        // it as a miss rather than serving bytes we cannot vouch for.
        if payload_canonical_digest(&entry.payload) != entry.payload_digest {
            warn!(fingerprint = %entry.fingerprint, "Metadata cache digest mismatch, ignoring entry");
            return None;
        }
        let raw: RawShow = serde_json::from_value(entry.payload.clone()).ok()?;
        Some(ServedMetadata {
            raw,
            payload_digest: entry.payload_digest.clone(),
            stale,
        })
    }

    async fn read_entry(&self, fingerprint: &str) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.fingerprint == fingerprint => Some(entry),
            Ok(_) => {
                warn!(path = %path.display(), "Metadata cache entry fingerprint mismatch");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Malformed metadata cache entry");
                None
            }
        }
    }

    async fn write_entry(&self, entry: &CacheEntry) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating metadata cache dir {}", self.dir.display()))?;
        let path = self.entry_path(&entry.fingerprint);
        let tmp = self.dir.join(format!(".{}.tmp", entry.fingerprint));
        let bytes = serde_json::to_vec_pretty(entry)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming {} into place", path.display()))?;
        Ok(())
    }
}

/// Digest over the compact serialization of the stored payload.
fn payload_canonical_digest(payload: &serde_json::Value) -> String {
    match serde_json::to_vec(payload) {
        Ok(bytes) => digest_bytes(&bytes),
        Err(_) => String::new(),
    }
}
