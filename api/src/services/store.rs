//! Transient on-disk storage for fetched media.
//!
//! Files live in one directory owned by this service. Writes go to a hidden
//! `.{uuid}.part` file and are renamed into place, so a reader never sees a
//! partial file. Nothing here runs on a timer: the pipeline calls
//! [`TransientStore::sweep`] after every request.

use chrono::Utc;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::StoredArtifact;
use crate::services::error::{PipelineError, StorageContext};

#[derive(Debug, Clone)]
pub struct TransientStore {
    dir: PathBuf,
}

/// Map a content type to a file extension
pub fn get_extension(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-flv" => "flv",
        "audio/mp4" | "audio/m4a" => "m4a",
        "audio/mpeg" => "mp3",
        "image/gif" => "gif",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        _ => "bin",
    }
}

fn sanitize_extension(ext: &str) -> &str {
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        "bin"
    }
}

impl TransientStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `data` under a fresh random name.
    pub async fn save(&self, data: &[u8], suggested_ext: &str) -> Result<StoredArtifact, PipelineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .storage_context("create temp directory")?;

        let id = Uuid::new_v4();
        let ext = sanitize_extension(suggested_ext);
        let part_path = self.dir.join(format!(".{}.part", id));
        let file_path = self.dir.join(format!("{}.{}", id, ext));

        if let Err(e) = tokio::fs::write(&part_path, data).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(PipelineError::StorageFailed {
                context: "write media file",
                source: e,
            });
        }
        tokio::fs::rename(&part_path, &file_path)
            .await
            .storage_context("publish media file")?;

        debug!(artifact = %file_path.display(), bytes = data.len(), "Stored artifact");
        Ok(StoredArtifact {
            id,
            file_path,
            created_at: Utc::now(),
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, artifact: &StoredArtifact) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(&artifact.file_path)
            .await
            .storage_context("read media file")
    }

    /// Delete an artifact. Deleting an already-deleted file succeeds.
    pub async fn remove(&self, artifact: &StoredArtifact) -> Result<(), PipelineError> {
        match tokio::fs::remove_file(&artifact.file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::StorageFailed {
                context: "remove media file",
                source: e,
            }),
        }
    }

    /// Delete files last modified more than `retention` ago.
    /// Returns how many files were deleted.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.sweep_older_than(cutoff).await
    }

    /// Per-file failures are logged and skipped so one bad entry never
    /// stops the rest of the sweep.
    pub async fn sweep_older_than(&self, cutoff: SystemTime) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Failed to read temp directory: {}", e);
                return 0;
            }
        };

        let mut paths = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => paths.push(entry.path()),
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list temp directory entry: {}", e);
                    break;
                }
            }
        }

        let deleted = sweep_paths(&paths, cutoff).await;
        if deleted > 0 {
            debug!(deleted, dir = %self.dir.display(), "Swept stale media");
        }
        deleted
    }
}

async fn sweep_paths(paths: &[PathBuf], cutoff: SystemTime) -> usize {
    let mut deleted = 0;
    for path in paths {
        match remove_if_stale(path, cutoff).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => warn!("Failed to sweep {}: {}", path.display(), e),
        }
    }
    deleted
}

/// Delete `path` if it is a regular file last modified before `cutoff`.
/// Returns whether this call deleted it.
async fn remove_if_stale(path: &Path, cutoff: SystemTime) -> io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if !metadata.is_file() || metadata.modified()? >= cutoff {
        return Ok(false);
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn set_age(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn extensions_follow_content_type() {
        assert_eq!(get_extension("video/mp4"), "mp4");
        assert_eq!(get_extension("Video/MP4; codecs=avc1"), "mp4");
        assert_eq!(get_extension("application/octet-stream"), "bin");
        assert_eq!(sanitize_extension("../etc"), "bin");
        assert_eq!(sanitize_extension(""), "bin");
    }

    #[tokio::test]
    async fn save_creates_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        let store = TransientStore::new(tmp.path().join("nested").join("media"));

        let artifact = store.save(b"hello", "mp4").await.unwrap();
        assert!(artifact.file_path.starts_with(store.dir()));
        assert_eq!(artifact.file_path.extension().unwrap(), "mp4");
        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(store.read(&artifact).await.unwrap(), b"hello");

        // No leftover .part files
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".part"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = TransientStore::new(tmp.path());
        let artifact = store.save(b"x", "mp4").await.unwrap();

        store.remove(&artifact).await.unwrap();
        store.remove(&artifact).await.unwrap();
        assert!(!artifact.file_path.exists());
    }

    #[tokio::test]
    async fn sweep_respects_retention_window() {
        let tmp = TempDir::new().unwrap();
        let store = TransientStore::new(tmp.path());
        let stale = store.save(b"old", "mp4").await.unwrap();
        let fresh = store.save(b"new", "mp4").await.unwrap();
        set_age(&stale.file_path, Duration::from_secs(31 * 60));
        set_age(&fresh.file_path, Duration::from_secs(29 * 60));
        std::fs::create_dir(tmp.path().join("subdir")).unwrap();

        let deleted = store.sweep(Duration::from_secs(30 * 60)).await;

        assert_eq!(deleted, 1);
        assert!(!stale.file_path.exists());
        assert!(fresh.file_path.exists());
        assert!(tmp.path().join("subdir").exists());
    }

    #[tokio::test]
    async fn failing_entry_does_not_stop_the_sweep() {
        let tmp = TempDir::new().unwrap();
        let store = TransientStore::new(tmp.path());
        let first = store.save(b"a", "mp4").await.unwrap();
        let second = store.save(b"b", "mp4").await.unwrap();
        set_age(&first.file_path, Duration::from_secs(31 * 60));
        set_age(&second.file_path, Duration::from_secs(31 * 60));

        // Stat through a regular file fails with ENOTDIR, even as root
        let broken = first.file_path.join("child");
        assert!(remove_if_stale(&broken, SystemTime::now()).await.is_err());

        let paths = vec![first.file_path.clone(), broken, second.file_path.clone()];
        let cutoff = SystemTime::now() - Duration::from_secs(30 * 60);
        assert_eq!(sweep_paths(&paths, cutoff).await, 2);
        assert!(!first.file_path.exists());
        assert!(!second.file_path.exists());
    }

    #[tokio::test]
    async fn sweep_of_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = TransientStore::new(tmp.path().join("never-created"));
        assert_eq!(store.sweep(Duration::from_secs(60)).await, 0);
    }

    #[tokio::test]
    async fn concurrent_saves_never_collide() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(TransientStore::new(tmp.path()));

        let saves = (0..100u32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let payload = format!("payload-{i}").into_bytes();
                let artifact = store.save(&payload, "mp4").await.unwrap();
                (artifact, payload)
            })
        });
        let results: Vec<_> = futures::future::join_all(saves)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let paths: HashSet<_> = results.iter().map(|(a, _)| a.file_path.clone()).collect();
        assert_eq!(paths.len(), 100);
        for (artifact, payload) in &results {
            assert_eq!(&std::fs::read(&artifact.file_path).unwrap(), payload);
        }
    }
}
