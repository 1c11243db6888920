use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::Result;

const SECS_PER_DAY: u64 = 86_400;

/// Remove `*.parquet` files in `dir` last modified strictly before
/// `now - keep_days`. A missing directory is not an error.
pub fn cleanup_old_exports(dir: &Path, keep_days: u32, now: SystemTime) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !dir.exists() {
        return Ok(removed);
    }

    let cutoff = now
        .checked_sub(Duration::from_secs(u64::from(keep_days) * SECS_PER_DAY))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if modified < cutoff {
            tracing::info!(
                "Removing old export: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}
