//! Atomic JSON persistence: write to a temp file in the same directory,
//! then rename over the destination, so a concurrent reader only ever
//! observes a fully-written, committed file.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::LiqsolError;

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LiqsolError> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| LiqsolError::bad_input(format!("failed to serialize {}: {e}", path.display())))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("persist"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, &body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, LiqsolError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| LiqsolError::bad_input(format!("failed to parse {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Appends one line to a file via read-all + rewrite-atomic, preserving the
/// "readers only observe committed states" guarantee for line-oriented
/// snapshot files like `obligations.jsonl`.
pub async fn append_line_atomic(path: &Path, line: &str) -> Result<(), LiqsolError> {
    let mut existing = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if !existing.is_empty() && !existing.ends_with('\n') {
        existing.push('\n');
    }
    existing.push_str(line);
    existing.push('\n');

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("persist"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, existing.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, PartialEq, Debug)]
    struct Sample {
        n: u32,
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let dir = tempdir();
        let path = dir.join("sample.json");
        write_json_atomic(&path, &Sample { n: 7 }).await.unwrap();
        let read: Sample = read_json(&path).await.unwrap();
        assert_eq!(read, Sample { n: 7 });
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn read_missing_file_returns_default() {
        let dir = tempdir();
        let path = dir.join("missing.json");
        let read: Sample = read_json(&path).await.unwrap();
        assert_eq!(read, Sample::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn tempdir() -> std::path::PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("liqsol-persist-test-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
