//! Atomic write and draft rotation (spec §4.2, §5).
//!
//! A write never leaves a half-written file visible: content lands in a
//! sibling temp file, is flushed, then renamed over the target. Rotation
//! moves a file that's about to be overwritten into a `history/` directory
//! (timestamped) before the overwrite happens, and prunes that directory
//! to the last `keep` entries.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use wenshape_protocol::error::StorageError;

pub const DEFAULT_HISTORY_KEEP: usize = 3;

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `contents` to `path` atomically: write to `path.tmp.<pid>`, flush,
/// fsync, then rename over `path`. Creates parent directories as needed.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = sibling_tmp_path(path);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| io_err(&tmp_path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| io_err(&tmp_path, e))?;
    file.sync_all().await.map_err(|e| io_err(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).await.map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        StorageError::AtomicRename {
            path: path.display().to_string(),
            source: e,
        }
    })?;
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()))
}

/// If `path` exists, move it into `history_dir/<stem>_<timestamp>.<ext>`
/// before it gets overwritten, then prune `history_dir` to `keep` newest
/// entries. No-op if `path` doesn't exist yet.
pub async fn rotate_into_history(
    path: &Path,
    history_dir: &Path,
    keep: usize,
) -> Result<(), StorageError> {
    if fs::metadata(path).await.is_err() {
        return Ok(());
    }
    fs::create_dir_all(history_dir)
        .await
        .map_err(|e| io_err(history_dir, e))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let dest = history_dir.join(format!("{stem}_{timestamp}{ext}"));

    fs::rename(path, &dest).await.map_err(|e| StorageError::AtomicRename {
        path: dest.display().to_string(),
        source: e,
    })?;

    prune_history(history_dir, keep).await
}

/// Keep only the `keep` most-recently-modified entries in `history_dir`.
async fn prune_history(history_dir: &Path, keep: usize) -> Result<(), StorageError> {
    let mut entries = Vec::new();
    let mut reader = fs::read_dir(history_dir)
        .await
        .map_err(|e| io_err(history_dir, e))?;
    while let Some(entry) = reader.next_entry().await.map_err(|e| io_err(history_dir, e))? {
        let metadata = entry.metadata().await.map_err(|e| io_err(history_dir, e))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().map_err(|e| io_err(history_dir, e))?;
        entries.push((modified, entry.path()));
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in entries.into_iter().skip(keep) {
        let _ = fs::remove_file(&path).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn atomic_write_creates_parents_and_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        atomic_write(&path, b"hello").await.unwrap();
        let read = tokio::fs::read(&path).await.unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn atomic_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("draft.md");
        atomic_write(&path, b"v1").await.unwrap();
        atomic_write(&path, b"v2").await.unwrap();
        let read = tokio::fs::read(&path).await.unwrap();
        assert_eq!(read, b"v2");
    }

    #[tokio::test]
    async fn rotate_into_history_noop_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("draft.md");
        let history = dir.path().join("history");
        rotate_into_history(&path, &history, 3).await.unwrap();
        assert!(!history.exists() || tokio::fs::read_dir(&history).await.unwrap().next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_into_history_moves_and_prunes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("draft.md");
        let history = dir.path().join("history");

        for i in 0..5 {
            atomic_write(&path, format!("v{i}").as_bytes()).await.unwrap();
            rotate_into_history(&path, &history, 3).await.unwrap();
            atomic_write(&path, format!("v{i}").as_bytes()).await.unwrap();
        }

        let mut count = 0;
        let mut reader = tokio::fs::read_dir(&history).await.unwrap();
        while reader.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert!(count <= 3, "expected at most 3 history entries, got {count}");
    }
}
