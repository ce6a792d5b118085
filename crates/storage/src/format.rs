//! Typed YAML / JSON / JSONL read-write helpers layered over [`atomic_write`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use wenshape_protocol::error::StorageError;

use crate::atomic::atomic_write;

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn format_err(
    path: &Path,
    format: &'static str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> StorageError {
    StorageError::Format {
        path: path.display().to_string(),
        format,
        source: Box::new(source),
    }
}

pub async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_yaml::from_slice(&bytes).map_err(|e| format_err(path, "yaml", e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

pub async fn write_yaml<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_yaml::to_string(value)
        .map_err(|e| format_err(path, "yaml", e))?
        .into_bytes();
    atomic_write(path, &bytes).await
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| format_err(path, "json", e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

pub async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| format_err(path, "json", e))?;
    atomic_write(path, &bytes).await
}

/// Reads a JSONL file, skipping (not failing on) lines that fail to
/// parse, per the tolerant-read contract this project applies to
/// append-only canon logs. Blank lines are skipped silently.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path, e)),
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut items = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(item) = serde_json::from_str::<T>(trimmed) {
            items.push(item);
        } else {
            tracing::warn!(path = %path.display(), "skipping unparseable jsonl line");
        }
    }
    Ok(items)
}

/// Overwrites a JSONL file with one serialized entry per line, atomically.
pub async fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StorageError> {
    let mut buf = String::new();
    for item in items {
        let line = serde_json::to_string(item).map_err(|e| format_err(path, "jsonl", e))?;
        buf.push_str(&line);
        buf.push('\n');
    }
    atomic_write(path, buf.as_bytes()).await
}

/// Appends a single entry to a JSONL file without rewriting the rest, using
/// a plain append-mode write (no atomic rename — the file only ever grows).
pub async fn append_jsonl<T: Serialize>(path: &Path, item: &T) -> Result<(), StorageError> {
    use tokio::io::AsyncWriteExt;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| io_err(parent, e))?;
    }
    let mut line = serde_json::to_string(item).map_err(|e| format_err(path, "jsonl", e))?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_err(path, e))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn yaml_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("row.yaml");
        let row = Row { id: 1, name: "a".into() };
        write_yaml(&path, &row).await.unwrap();
        let read: Row = read_yaml(&path).await.unwrap().unwrap();
        assert_eq!(read, row);
    }

    #[tokio::test]
    async fn missing_yaml_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let read: Option<Row> = read_yaml(&path).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn jsonl_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        append_jsonl(&path, &Row { id: 1, name: "a".into() }).await.unwrap();
        append_jsonl(&path, &Row { id: 2, name: "b".into() }).await.unwrap();
        let rows: Vec<Row> = read_jsonl(&path).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, 2);
    }

    #[tokio::test]
    async fn jsonl_skips_unparseable_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        tokio::fs::write(&path, b"{\"id\":1,\"name\":\"a\"}\nnot json\n{\"id\":2,\"name\":\"b\"}\n")
            .await
            .unwrap();
        let rows: Vec<Row> = read_jsonl(&path).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn write_jsonl_overwrites_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        append_jsonl(&path, &Row { id: 1, name: "a".into() }).await.unwrap();
        append_jsonl(&path, &Row { id: 2, name: "b".into() }).await.unwrap();
        write_jsonl(&path, &[Row { id: 3, name: "c".into() }]).await.unwrap();
        let rows: Vec<Row> = read_jsonl(&path).await.unwrap();
        assert_eq!(rows, vec![Row { id: 3, name: "c".into() }]);
    }
}
