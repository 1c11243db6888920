use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Replace the whole warehouse table
    Full,
    /// Append rows fetched since the last export
    Incremental,
    /// Only make sure the dataset exists
    Schema,
    /// Remove old local export files
    Cleanup,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportMode::Full => "full",
            ExportMode::Incremental => "incremental",
            ExportMode::Schema => "schema",
            ExportMode::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Persisted record of the last successful export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportState {
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub last_export: Option<DateTime<Utc>>,
    /// Watermark: rows with a later `fetched_at` have not been exported yet.
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mode: Option<ExportMode>,
    #[serde(default)]
    pub rows: u64,
}

impl ExportState {
    /// Read the state file; a missing file means no export has happened yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// State after a successful run. The watermark never moves backwards.
    pub fn advanced(
        &self,
        mode: ExportMode,
        rows: u64,
        store_max: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let last_fetched_at = match (self.last_fetched_at, store_max) {
            (Some(prev), Some(max)) => Some(prev.max(max)),
            (prev, max) => max.or(prev),
        };
        Self {
            last_export: Some(now),
            last_fetched_at,
            mode: Some(mode),
            rows,
        }
    }
}
