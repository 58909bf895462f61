//! Shared file-partition plumbing: path layout, JSON-lines codec, and the
//! temp-file + atomic-rename publish every store write goes through.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A partition file could not be read or written. Fatal for the single
    /// day/collection it covers; callers doing batch work count it and move on.
    #[error("partition io error at {path}: {source}")]
    PartitionIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A partition file exists but holds a line that does not decode.
    #[error("corrupt partition at {path}: {detail}")]
    Corrupt { path: String, detail: String },

    /// A store key (website id) that is not a plain path component.
    #[error("invalid store key: {key:?}")]
    InvalidKey { key: String },
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::PartitionIo {
            path: path.display().to_string(),
            source,
        }
    }
}

/// `<root>/<website_id>/<YYYY-MM-DD>.<ext>`
pub fn day_path(root: &Path, website_id: &str, date: NaiveDate, ext: &str) -> PathBuf {
    root.join(website_id).join(format!("{date}.{ext}"))
}

/// Store keys become path components under the store root. Anything that
/// could traverse out of it (separators, `.`/`..`, NUL) is rejected before
/// a path is ever built — website ids arrive unauthenticated on the wire.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Decode a JSON-lines partition file. A missing file is an empty partition.
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            detail: format!("line {}: {e}", idx + 1),
        })?;
        out.push(item);
    }
    Ok(out)
}

/// Serialize `items` as JSON lines and publish atomically.
pub fn write_lines<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let mut buf = Vec::with_capacity(items.len() * 256);
    for item in items {
        serde_json::to_writer(&mut buf, item).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        buf.push(b'\n');
    }
    publish(path, &buf)
}

/// Decode a whole-document JSON file. Missing file -> `None`.
pub fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
}

/// Serialize a whole document and publish atomically (replace, never merge).
pub fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
    let buf = serde_json::to_vec(doc).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    publish(path, &buf)
}

/// Write to a temp file unique to this write, then rename over the target.
/// Readers only ever observe the previous complete file or the new complete
/// file, and concurrent publishers to the same target never share a temp
/// path.
fn publish(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    static PUBLISH_SEQ: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(path, e))?;
    }
    let tmp = path.with_extension(format!(
        "tmp.{}.{}",
        std::process::id(),
        PUBLISH_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    {
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("sitepulse-partition-{name}-{nanos}"))
    }

    #[test]
    fn missing_partition_reads_empty() {
        let rows: Vec<Row> = read_lines(&temp_path("missing")).expect("read");
        assert!(rows.is_empty());
    }

    #[test]
    fn lines_round_trip_through_atomic_publish() {
        let path = temp_path("roundtrip").join("w").join("2026-01-01.jsonl");
        write_lines(&path, &[Row { n: 1 }, Row { n: 2 }]).expect("write");
        let rows: Vec<Row> = read_lines(&path).expect("read");
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
    }

    #[test]
    fn corrupt_line_is_reported_not_skipped() {
        let path = temp_path("corrupt");
        fs::write(&path, "{\"n\":1}\nnot json\n").expect("write raw");
        let err = read_lines::<Row>(&path).expect_err("should fail");
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn traversal_shaped_keys_are_rejected() {
        for key in ["", ".", "..", "../../outside", "a/b", "a\\b", "x\0y"] {
            assert!(
                matches!(validate_key(key), Err(StoreError::InvalidKey { .. })),
                "key {key:?} should be invalid"
            );
        }
        for key in ["site-a", "site_1", "example.com", "a..b"] {
            assert!(validate_key(key).is_ok(), "key {key:?} should be valid");
        }
    }
}
