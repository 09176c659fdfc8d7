//! Filesystem materialization of matched destinations
//!
//! Performs the configured action (hardlink, copy, symlink) atomically:
//! the link or copy is staged as a temp sibling and renamed into place, so
//! no reader ever sees a partial destination. Existing destinations are
//! kept unless the incoming match carries strictly higher specificity.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LinkMode;
use crate::services::fingerprint;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("destination conflict at {0}")]
    DestinationConflict(PathBuf),
    #[error("cross-device hardlink refused for {0}")]
    CrossDeviceLink(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("source vanished: {0}")]
    SourceVanished(PathBuf),
    #[error("link failed: {0}")]
    Other(String),
}

/// Specificity of the match that produced a destination. Lower pattern
/// priority wins; an exact session token beats a fuzzy one at equal
/// priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specificity {
    pub pattern_priority: i32,
    pub session_exact: bool,
}

impl Specificity {
    /// Whether an incoming match should replace an existing destination.
    pub fn beats(&self, existing: &Specificity) -> bool {
        if self.pattern_priority != existing.pattern_priority {
            return self.pattern_priority < existing.pattern_priority;
        }
        self.session_exact && !existing.session_exact
    }
}

/// What the linker did with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Destination newly created.
    Created,
    /// Destination already pointed at the same content.
    AlreadyLinked,
    /// Existing destination replaced by a more specific match.
    Replaced,
    /// Existing destination kept; incoming match was not more specific.
    SkippedExisting,
}

pub struct Linker {
    /// Cross-filesystem hardlinks fall back to a copy only when enabled.
    fallback_to_copy: bool,
}

impl Linker {
    pub fn new(fallback_to_copy: bool) -> Self {
        Self { fallback_to_copy }
    }

    /// Materialize `source` at `destination` under the overwrite contract.
    ///
    /// `existing_specificity` is the recorded specificity of whatever
    /// produced the current destination, when known.
    pub async fn link(
        &self,
        source: &Path,
        destination: &Path,
        mode: LinkMode,
        incoming: Specificity,
        existing_specificity: Option<Specificity>,
    ) -> Result<LinkOutcome, LinkError> {
        if !source_exists(source).await {
            return Err(LinkError::SourceVanished(source.to_path_buf()));
        }

        if destination_exists(destination).await {
            if self.same_content(source, destination, mode).await? {
                debug!(
                    destination = %destination.display(),
                    "Destination already carries this content"
                );
                return Ok(LinkOutcome::AlreadyLinked);
            }

            let replace = match existing_specificity {
                Some(existing) => incoming.beats(&existing),
                // Unknown provenance: keep what is there.
                None => false,
            };
            if !replace {
                debug!(
                    destination = %destination.display(),
                    "Keeping existing destination"
                );
                return Ok(LinkOutcome::SkippedExisting);
            }

            info!(
                destination = %destination.display(),
                incoming_priority = incoming.pattern_priority,
                "Replacing destination with more specific match"
            );
            self.stage_and_rename(source, destination, mode).await?;
            return Ok(LinkOutcome::Replaced);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, destination))?;
        }
        self.stage_and_rename(source, destination, mode).await?;
        Ok(LinkOutcome::Created)
    }

    /// Stage the action as a temp sibling, then rename into place. Rename
    /// within one directory is atomic, which also makes replacement safe.
    async fn stage_and_rename(
        &self,
        source: &Path,
        destination: &Path,
        mode: LinkMode,
    ) -> Result<(), LinkError> {
        let staging = staging_path(destination);
        let _ = tokio::fs::remove_file(&staging).await;

        let result = match mode {
            LinkMode::Hardlink => {
                match tokio::fs::hard_link(source, &staging).await {
                    Ok(()) => Ok(()),
                    Err(e) if is_cross_device(&e) => {
                        if self.fallback_to_copy {
                            warn!(
                                source = %source.display(),
                                destination = %destination.display(),
                                "Cross-device hardlink, falling back to copy"
                            );
                            tokio::fs::copy(source, &staging).await.map(|_| ())
                        } else {
                            return Err(LinkError::CrossDeviceLink(destination.to_path_buf()));
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            LinkMode::Copy => tokio::fs::copy(source, &staging).await.map(|_| ()),
            LinkMode::Symlink => {
                #[cfg(unix)]
                {
                    tokio::fs::symlink(source, &staging).await
                }
                #[cfg(not(unix))]
                {
                    tokio::fs::copy(source, &staging).await.map(|_| ())
                }
            }
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(map_io(e, destination));
        }

        if let Err(e) = tokio::fs::rename(&staging, destination).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(map_io(e, destination));
        }
        Ok(())
    }

    /// Whether the destination already points at the source's content:
    /// device+inode for hardlinks, digest comparison otherwise.
    async fn same_content(
        &self,
        source: &Path,
        destination: &Path,
        mode: LinkMode,
    ) -> Result<bool, LinkError> {
        if mode == LinkMode::Hardlink {
            #[cfg(unix)]
            {
                use std::os::unix::fs::MetadataExt;
                let src = tokio::fs::metadata(source)
                    .await
                    .map_err(|e| map_io(e, source))?;
                let dst = tokio::fs::metadata(destination)
                    .await
                    .map_err(|e| map_io(e, destination))?;
                return Ok(src.dev() == dst.dev() && src.ino() == dst.ino());
            }
        }
        if mode == LinkMode::Symlink {
            if let Ok(target) = tokio::fs::read_link(destination).await {
                return Ok(target == source);
            }
        }
        // Cheap size gate before hashing both sides.
        let src_meta = tokio::fs::metadata(source)
            .await
            .map_err(|e| map_io(e, source))?;
        let dst_meta = tokio::fs::metadata(destination)
            .await
            .map_err(|e| map_io(e, destination))?;
        if src_meta.len() != dst_meta.len() {
            return Ok(false);
        }
        let src_digest = fingerprint::digest_file(source)
            .await
            .map_err(|e| LinkError::Other(e.to_string()))?;
        let dst_digest = fingerprint::digest_file(destination)
            .await
            .map_err(|e| LinkError::Other(e.to_string()))?;
        Ok(src_digest == dst_digest)
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "destination".to_string());
    destination.with_file_name(format!(".{name}.partial"))
}

async fn source_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

async fn destination_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc_exdev())
}

/// EXDEV without pulling in libc just for one constant.
const fn libc_exdev() -> i32 {
    18
}

fn map_io(err: io::Error, path: &Path) -> LinkError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            LinkError::PermissionDenied(format!("{}: {err}", path.display()))
        }
        io::ErrorKind::NotFound => LinkError::SourceVanished(path.to_path_buf()),
        io::ErrorKind::AlreadyExists => LinkError::DestinationConflict(path.to_path_buf()),
        _ => {
            if is_cross_device(&err) {
                LinkError::CrossDeviceLink(path.to_path_buf())
            } else {
                LinkError::Other(format!("{}: {err}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(priority: i32, exact: bool) -> Specificity {
        Specificity {
            pattern_priority: priority,
            session_exact: exact,
        }
    }

    #[test]
    fn lower_priority_beats_higher() {
        assert!(spec(10, false).beats(&spec(100, true)));
        assert!(!spec(100, true).beats(&spec(10, false)));
    }

    #[test]
    fn exact_session_breaks_priority_ties() {
        assert!(spec(50, true).beats(&spec(50, false)));
        assert!(!spec(50, false).beats(&spec(50, false)));
        assert!(!spec(50, true).beats(&spec(50, true)));
    }

    #[tokio::test]
    async fn creates_hardlink_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mkv");
        tokio::fs::write(&source, b"payload").await.unwrap();
        let destination = dir.path().join("lib/show/season/episode.mkv");

        let linker = Linker::new(false);
        let outcome = linker
            .link(&source, &destination, LinkMode::Hardlink, spec(10, true), None)
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::Created);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn relinking_same_content_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mkv");
        tokio::fs::write(&source, b"payload").await.unwrap();
        let destination = dir.path().join("episode.mkv");

        let linker = Linker::new(false);
        linker
            .link(&source, &destination, LinkMode::Hardlink, spec(10, true), None)
            .await
            .unwrap();
        let outcome = linker
            .link(&source, &destination, LinkMode::Hardlink, spec(10, true), None)
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::AlreadyLinked);
    }

    #[tokio::test]
    async fn different_content_keeps_existing_without_specificity_win() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mkv");
        let second = dir.path().join("second.mkv");
        tokio::fs::write(&first, b"one").await.unwrap();
        tokio::fs::write(&second, b"two").await.unwrap();
        let destination = dir.path().join("episode.mkv");

        let linker = Linker::new(false);
        linker
            .link(&first, &destination, LinkMode::Copy, spec(100, false), None)
            .await
            .unwrap();
        let outcome = linker
            .link(
                &second,
                &destination,
                LinkMode::Copy,
                spec(100, false),
                Some(spec(100, false)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::SkippedExisting);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn stronger_pattern_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let weak = dir.path().join("weak.mkv");
        let strong = dir.path().join("strong.mkv");
        tokio::fs::write(&weak, b"weak").await.unwrap();
        tokio::fs::write(&strong, b"strong").await.unwrap();
        let destination = dir.path().join("episode.mkv");

        let linker = Linker::new(false);
        linker
            .link(&weak, &destination, LinkMode::Copy, spec(100, false), None)
            .await
            .unwrap();
        let outcome = linker
            .link(
                &strong,
                &destination,
                LinkMode::Copy,
                spec(10, true),
                Some(spec(100, false)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::Replaced);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"strong");
    }

    #[tokio::test]
    async fn vanished_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let linker = Linker::new(false);
        let err = linker
            .link(
                &dir.path().join("gone.mkv"),
                &dir.path().join("episode.mkv"),
                LinkMode::Copy,
                spec(10, true),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::SourceVanished(_)));
    }

    #[tokio::test]
    async fn symlink_mode_points_at_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mkv");
        tokio::fs::write(&source, b"payload").await.unwrap();
        let destination = dir.path().join("episode.mkv");

        let linker = Linker::new(false);
        linker
            .link(&source, &destination, LinkMode::Symlink, spec(10, true), None)
            .await
            .unwrap();
        #[cfg(unix)]
        {
            let target = tokio::fs::read_link(&destination).await.unwrap();
            assert_eq!(target, source);
        }
        let outcome = linker
            .link(&source, &destination, LinkMode::Symlink, spec(10, true), None)
            .await
            .unwrap();
        assert_eq!(outcome, LinkOutcome::AlreadyLinked);
    }
}
