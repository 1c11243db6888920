//! Object storage and warehouse access through the `gsutil` and `bq` CLIs.

use std::path::Path;

use tokio::process::Command;

use crate::config::ExportConfig;
use crate::error::{AppError, Result};

/// How a load treats rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDisposition {
    Replace,
    Append,
}

#[allow(async_fn_in_trait)]
pub trait ObjectStorage {
    /// Upload `local` under `key` and return the object URI.
    async fn upload(&self, local: &Path, key: &str) -> Result<String>;
}

#[allow(async_fn_in_trait)]
pub trait Warehouse {
    /// Create the destination dataset if it does not exist yet.
    async fn ensure_dataset(&self) -> Result<()>;

    async fn table_exists(&self) -> Result<bool>;

    /// Load a Parquet object into the destination table.
    async fn load(&self, uri: &str, disposition: LoadDisposition) -> Result<()>;

    /// Total rows in the destination table.
    async fn row_count(&self) -> Result<u64>;
}

/// Run a CLI to completion; a non-zero exit is an error carrying stderr.
async fn run(program: &str, args: &[&str]) -> Result<String> {
    tracing::debug!(program, ?args, "Running external command");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AppError::ExternalCommand {
            program: program.to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(AppError::ExternalCommand {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a CLI only to learn whether it exits successfully.
async fn succeeds(program: &str, args: &[&str]) -> Result<bool> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AppError::ExternalCommand {
            program: program.to_string(),
            stderr: e.to_string(),
        })?;
    Ok(output.status.success())
}

pub struct GsutilStorage {
    bucket: String,
}

impl GsutilStorage {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
        }
    }
}

impl ObjectStorage for GsutilStorage {
    async fn upload(&self, local: &Path, key: &str) -> Result<String> {
        let uri = format!("gs://{}/{}", self.bucket, key.trim_start_matches('/'));
        let local = local.to_string_lossy();
        run("gsutil", &["-q", "cp", local.as_ref(), uri.as_str()]).await?;
        Ok(uri)
    }
}

pub struct BqWarehouse {
    project: String,
    dataset: String,
    table: String,
}

impl BqWarehouse {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            project: config.project.clone(),
            dataset: config.dataset.clone(),
            table: config.table.clone(),
        }
    }

    fn dataset_ref(&self) -> String {
        format!("{}:{}", self.project, self.dataset)
    }

    fn table_ref(&self) -> String {
        format!("{}:{}.{}", self.project, self.dataset, self.table)
    }
}

impl Warehouse for BqWarehouse {
    async fn ensure_dataset(&self) -> Result<()> {
        let dataset = self.dataset_ref();
        if succeeds("bq", &["show", dataset.as_str()]).await? {
            tracing::info!("Dataset {} exists", self.dataset);
            return Ok(());
        }

        run("bq", &["mk", "--dataset", dataset.as_str()]).await?;
        tracing::info!("Created dataset {}", self.dataset);
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        let table = self.table_ref();
        succeeds("bq", &["show", table.as_str()]).await
    }

    async fn load(&self, uri: &str, disposition: LoadDisposition) -> Result<()> {
        let replace = match disposition {
            LoadDisposition::Replace => "--replace=true",
            LoadDisposition::Append => "--replace=false",
        };
        let table = self.table_ref();
        tracing::info!("Loading {} to {} ({:?})...", uri, table, disposition);
        run(
            "bq",
            &["load", "--source_format=PARQUET", replace, table.as_str(), uri],
        )
        .await?;
        Ok(())
    }

    async fn row_count(&self) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM `{}.{}.{}`",
            self.project, self.dataset, self.table
        );
        let stdout = run(
            "bq",
            &["query", "--nouse_legacy_sql", "--format=csv", query.as_str()],
        )
        .await?;
        parse_count_csv(&stdout)
            .ok_or_else(|| anyhow::anyhow!("unexpected row count output: {stdout}").into())
    }
}

/// `bq --format=csv` prints a header line and then the value.
fn parse_count_csv(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .nth(1)
        .and_then(|l| l.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_csv_skips_header() {
        assert_eq!(parse_count_csv("cnt\n1234\n"), Some(1234));
        assert_eq!(parse_count_csv("\ncnt\n\n7"), Some(7));
        assert_eq!(parse_count_csv("cnt\n"), None);
        assert_eq!(parse_count_csv("cnt\nlots\n"), None);
    }

    #[test]
    fn references_use_bq_syntax() {
        let warehouse = BqWarehouse::new(&ExportConfig::default());
        assert_eq!(warehouse.dataset_ref(), "the-molt-report:moltbook");
        assert_eq!(warehouse.table_ref(), "the-molt-report:moltbook.posts");
    }

    #[tokio::test]
    async fn missing_program_is_an_external_command_error() {
        let err = run("molt-tracker-no-such-binary", &["--version"])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalCommand { .. }));
    }
}
