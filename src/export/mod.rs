//! Local store to warehouse export.
//!
//! Each run reads the persisted [`ExportState`], picks a read range, writes
//! the rows to a Parquet file, uploads it, loads it and only then moves the
//! watermark. A failure anywhere before the state write leaves the watermark
//! where it was, so the next run covers the same range again.
//!
//! Full and incremental runs finish with a retention pass over the local
//! export directory; `cleanup` runs that pass alone.

mod cleanup;
mod cloud;
mod columnar;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::ExportConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{ExportMode, ExportState};

pub use cleanup::cleanup_old_exports;
pub use cloud::{BqWarehouse, GsutilStorage, LoadDisposition, ObjectStorage, Warehouse};
pub use columnar::write_parquet;

/// What a run will do, given the requested mode and the persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportPlan {
    /// Read everything and replace the destination table. `no_prior_export`
    /// is set when an incremental run had no watermark to start from.
    Full { no_prior_export: bool },
    /// Read rows fetched strictly after `since` and append them.
    Incremental { since: DateTime<Utc> },
    SchemaOnly,
    Cleanup,
}

impl ExportPlan {
    pub fn new(mode: ExportMode, state: &ExportState) -> Self {
        match mode {
            ExportMode::Full => ExportPlan::Full {
                no_prior_export: false,
            },
            ExportMode::Incremental => match state.last_fetched_at {
                Some(since) => ExportPlan::Incremental { since },
                None => ExportPlan::Full {
                    no_prior_export: true,
                },
            },
            ExportMode::Schema => ExportPlan::SchemaOnly,
            ExportMode::Cleanup => ExportPlan::Cleanup,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Exported {
        mode: ExportMode,
        rows: u64,
        file: PathBuf,
        uri: String,
        watermark: Option<DateTime<Utc>>,
        table_rows: Option<u64>,
    },
    /// Incremental run with nothing newer than the watermark.
    NothingToExport { since: DateTime<Utc> },
    SchemaChecked { table_exists: bool },
    Cleaned,
}

impl ExportOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            ExportOutcome::Exported { rows, .. } => *rows,
            _ => 0,
        }
    }
}

/// One export invocation: what happened to the warehouse, and which old
/// local files the retention pass removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRun {
    pub outcome: ExportOutcome,
    pub removed: Vec<PathBuf>,
}

pub struct Exporter<'a, S, W> {
    repo: &'a Repository,
    config: &'a ExportConfig,
    storage: S,
    warehouse: W,
}

impl<'a, S: ObjectStorage, W: Warehouse> Exporter<'a, S, W> {
    pub fn new(repo: &'a Repository, config: &'a ExportConfig, storage: S, warehouse: W) -> Self {
        Self {
            repo,
            config,
            storage,
            warehouse,
        }
    }

    fn state_path(&self) -> &Path {
        Path::new(&self.config.state_file)
    }

    pub async fn run(
        &self,
        mode: ExportMode,
        keep_days: u32,
        now: DateTime<Utc>,
    ) -> Result<ExportRun> {
        let outcome = self.apply(mode, now).await?;
        let removed = match mode {
            ExportMode::Schema => Vec::new(),
            ExportMode::Full | ExportMode::Incremental | ExportMode::Cleanup => {
                self.cleanup(keep_days)?
            }
        };
        Ok(ExportRun { outcome, removed })
    }

    async fn apply(&self, mode: ExportMode, now: DateTime<Utc>) -> Result<ExportOutcome> {
        let state = ExportState::load(self.state_path())?;

        match ExportPlan::new(mode, &state) {
            ExportPlan::Full { no_prior_export } => {
                if no_prior_export {
                    tracing::info!("No previous export found, running full export instead...");
                } else {
                    tracing::info!("Starting full export...");
                }
                let posts = self.repo.posts_for_export(None).await?;
                tracing::info!("Read {} rows from SQLite", posts.len());
                self.export(&state, ExportMode::Full, &posts, now).await
            }
            ExportPlan::Incremental { since } => {
                tracing::info!("Starting incremental export (since {})...", since);
                let posts = self.repo.posts_for_export(Some(since)).await?;
                if posts.is_empty() {
                    tracing::info!("No new rows to export");
                    return Ok(ExportOutcome::NothingToExport { since });
                }
                tracing::info!("Found {} new rows", posts.len());
                self.export(&state, ExportMode::Incremental, &posts, now).await
            }
            ExportPlan::SchemaOnly => {
                self.warehouse.ensure_dataset().await?;
                let table_exists = self.warehouse.table_exists().await?;
                if table_exists {
                    tracing::info!("Table {} already exists", self.config.table);
                } else {
                    tracing::info!("Table {} will be created on first data load", self.config.table);
                }
                Ok(ExportOutcome::SchemaChecked { table_exists })
            }
            ExportPlan::Cleanup => Ok(ExportOutcome::Cleaned),
        }
    }

    fn cleanup(&self, keep_days: u32) -> Result<Vec<PathBuf>> {
        cleanup_old_exports(
            Path::new(&self.config.dir),
            keep_days,
            std::time::SystemTime::now(),
        )
    }

    async fn export(
        &self,
        state: &ExportState,
        mode: ExportMode,
        posts: &[crate::models::Post],
        now: DateTime<Utc>,
    ) -> Result<ExportOutcome> {
        let (kind, disposition) = match mode {
            ExportMode::Incremental => ("incr", LoadDisposition::Append),
            _ => ("full", LoadDisposition::Replace),
        };
        let file_name = format!("posts_{}_{}.parquet", kind, now.format("%Y%m%d_%H%M%S"));
        let file = Path::new(&self.config.dir).join(&file_name);

        let size = write_parquet(&file, posts)?;
        tracing::info!(
            "Wrote Parquet to {} ({:.1} MB)",
            file.display(),
            size as f64 / 1024.0 / 1024.0
        );

        let key = format!("{}/{}", self.config.prefix.trim_end_matches('/'), file_name);
        let uri = self.storage.upload(&file, &key).await?;
        tracing::info!("Uploaded to {}", uri);

        self.warehouse.ensure_dataset().await?;
        self.warehouse.load(&uri, disposition).await?;

        let table_rows = match self.warehouse.row_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Could not count warehouse rows: {}", e);
                None
            }
        };

        // Watermark is the store's max at this moment, not the batch max.
        let store_max = self.repo.max_fetched_at().await?;
        let rows = posts.len() as u64;
        let next = state.advanced(mode, rows, store_max, now);
        next.save(self.state_path())?;

        tracing::info!("{} export complete: {} rows", mode, rows);
        Ok(ExportOutcome::Exported {
            mode,
            rows,
            file,
            uri,
            watermark: next.last_fetched_at,
            table_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use chrono::TimeZone;
    use serde_json::json;
    use std::cell::RefCell;
    use tokio_test::assert_ok;

    #[derive(Default)]
    struct FakeStorage {
        uploads: RefCell<Vec<String>>,
        fail: bool,
    }

    impl ObjectStorage for &FakeStorage {
        async fn upload(&self, local: &Path, key: &str) -> Result<String> {
            assert!(local.exists());
            if self.fail {
                return Err(AppError::ExternalCommand {
                    program: "gsutil".to_string(),
                    stderr: "AccessDenied".to_string(),
                });
            }
            self.uploads.borrow_mut().push(key.to_string());
            Ok(format!("gs://bucket/{key}"))
        }
    }

    #[derive(Default)]
    struct FakeWarehouse {
        loads: RefCell<Vec<(String, LoadDisposition)>>,
        datasets_ensured: RefCell<usize>,
        rows: RefCell<u64>,
    }

    impl Warehouse for &FakeWarehouse {
        async fn ensure_dataset(&self) -> Result<()> {
            *self.datasets_ensured.borrow_mut() += 1;
            Ok(())
        }

        async fn table_exists(&self) -> Result<bool> {
            Ok(!self.loads.borrow().is_empty())
        }

        async fn load(&self, uri: &str, disposition: LoadDisposition) -> Result<()> {
            self.loads.borrow_mut().push((uri.to_string(), disposition));
            Ok(())
        }

        async fn row_count(&self) -> Result<u64> {
            Ok(*self.rows.borrow())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: Repository,
        config: ExportConfig,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path().join("moltbook.db").to_str().unwrap())
            .await
            .unwrap();
        let config = ExportConfig {
            dir: dir.path().join("exports").to_string_lossy().to_string(),
            state_file: dir.path().join("state.json").to_string_lossy().to_string(),
            ..ExportConfig::default()
        };
        Fixture {
            _dir: dir,
            repo,
            config,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, hour, 0, 0).unwrap()
    }

    fn posts(ids: &[&str]) -> Vec<serde_json::Value> {
        ids.iter()
            .map(|id| json!({"id": id, "author": {"name": "alice"}}))
            .collect()
    }

    fn exported_files(config: &ExportConfig) -> usize {
        std::fs::read_dir(&config.dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn plan_follows_mode_and_watermark() {
        let empty = ExportState::default();
        let with_mark = ExportState {
            last_fetched_at: Some(at(9)),
            ..ExportState::default()
        };

        assert_eq!(
            ExportPlan::new(ExportMode::Incremental, &empty),
            ExportPlan::Full {
                no_prior_export: true
            }
        );
        assert_eq!(
            ExportPlan::new(ExportMode::Incremental, &with_mark),
            ExportPlan::Incremental { since: at(9) }
        );
        assert_eq!(
            ExportPlan::new(ExportMode::Full, &with_mark),
            ExportPlan::Full {
                no_prior_export: false
            }
        );
        assert_eq!(ExportPlan::new(ExportMode::Schema, &empty), ExportPlan::SchemaOnly);
        assert_eq!(ExportPlan::new(ExportMode::Cleanup, &with_mark), ExportPlan::Cleanup);
    }

    #[tokio::test]
    async fn first_incremental_is_full_then_only_new_rows() {
        let fx = fixture().await;
        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);

        fx.repo.upsert_posts(posts(&["A", "B", "C"]), at(1)).await.unwrap();
        let first = exporter
            .run(ExportMode::Incremental, 7, at(2))
            .await
            .unwrap()
            .outcome;

        match &first {
            ExportOutcome::Exported {
                mode,
                rows,
                watermark,
                ..
            } => {
                assert_eq!(*mode, ExportMode::Full);
                assert_eq!(*rows, 3);
                assert_eq!(*watermark, Some(at(1)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(warehouse.loads.borrow()[0].1, LoadDisposition::Replace);
        assert_eq!(
            storage.uploads.borrow()[0],
            "exports/parquet/posts_full_20260130_020000.parquet"
        );

        // re-fetch of A, B, C would bump them too; here only D is new
        fx.repo.upsert_posts(posts(&["D"]), at(3)).await.unwrap();
        let second = exporter
            .run(ExportMode::Incremental, 7, at(4))
            .await
            .unwrap()
            .outcome;

        assert_eq!(second.rows(), 1);
        let state = ExportState::load(Path::new(&fx.config.state_file)).unwrap();
        assert_eq!(state.last_fetched_at, Some(at(3)));
        assert_eq!(state.mode, Some(ExportMode::Incremental));
        assert_eq!(state.rows, 1);
        assert_eq!(warehouse.loads.borrow()[1].1, LoadDisposition::Append);
        assert!(warehouse.loads.borrow()[1].0.contains("posts_incr_20260130_040000"));
    }

    #[tokio::test]
    async fn incremental_with_nothing_new_changes_nothing() {
        let fx = fixture().await;
        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);

        fx.repo.upsert_posts(posts(&["A"]), at(1)).await.unwrap();
        assert_ok!(exporter.run(ExportMode::Full, 7, at(2)).await);
        let before = std::fs::read_to_string(&fx.config.state_file).unwrap();
        let files_before = exported_files(&fx.config);

        let outcome = exporter
            .run(ExportMode::Incremental, 7, at(5))
            .await
            .unwrap()
            .outcome;

        assert_eq!(outcome, ExportOutcome::NothingToExport { since: at(1) });
        assert_eq!(std::fs::read_to_string(&fx.config.state_file).unwrap(), before);
        assert_eq!(exported_files(&fx.config), files_before);
        assert_eq!(storage.uploads.borrow().len(), 1);
        assert_eq!(warehouse.loads.borrow().len(), 1);
    }

    #[tokio::test]
    async fn first_incremental_matches_full_row_set() {
        let fx = fixture().await;
        fx.repo.upsert_posts(posts(&["A", "B"]), at(1)).await.unwrap();
        fx.repo.upsert_posts(posts(&["C"]), at(2)).await.unwrap();

        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);
        let incremental = exporter
            .run(ExportMode::Incremental, 7, at(3))
            .await
            .unwrap()
            .outcome;

        std::fs::remove_file(&fx.config.state_file).unwrap();
        let full = exporter.run(ExportMode::Full, 7, at(4)).await.unwrap().outcome;

        assert_eq!(incremental.rows(), full.rows());
        assert_eq!(incremental.rows(), 3);
    }

    #[tokio::test]
    async fn failed_upload_keeps_watermark() {
        let fx = fixture().await;
        let storage = FakeStorage {
            fail: true,
            ..FakeStorage::default()
        };
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);

        fx.repo.upsert_posts(posts(&["A"]), at(1)).await.unwrap();
        let result = exporter.run(ExportMode::Full, 7, at(2)).await;

        assert!(matches!(result, Err(AppError::ExternalCommand { .. })));
        assert!(warehouse.loads.borrow().is_empty());
        assert!(!Path::new(&fx.config.state_file).exists());
    }

    #[tokio::test]
    async fn schema_mode_touches_no_data() {
        let fx = fixture().await;
        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);

        fx.repo.upsert_posts(posts(&["A"]), at(1)).await.unwrap();
        let outcome = exporter.run(ExportMode::Schema, 7, at(2)).await.unwrap().outcome;

        assert_eq!(outcome, ExportOutcome::SchemaChecked { table_exists: false });
        assert_eq!(*warehouse.datasets_ensured.borrow(), 1);
        assert!(storage.uploads.borrow().is_empty());
        assert_eq!(exported_files(&fx.config), 0);
        assert!(!Path::new(&fx.config.state_file).exists());
    }

    #[tokio::test]
    async fn full_on_empty_store_still_replaces_and_keeps_watermark() {
        let fx = fixture().await;
        let previous = ExportState {
            last_fetched_at: Some(at(5)),
            mode: Some(ExportMode::Incremental),
            rows: 12,
            ..ExportState::default()
        };
        previous.save(Path::new(&fx.config.state_file)).unwrap();

        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);
        let run = exporter.run(ExportMode::Full, 7, at(6)).await.unwrap();

        match &run.outcome {
            ExportOutcome::Exported {
                mode,
                rows,
                file,
                watermark,
                ..
            } => {
                assert_eq!(*mode, ExportMode::Full);
                assert_eq!(*rows, 0);
                assert!(file.exists());
                assert_eq!(*watermark, Some(at(5)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(exported_files(&fx.config), 1);
        assert_eq!(warehouse.loads.borrow().len(), 1);
        assert_eq!(warehouse.loads.borrow()[0].1, LoadDisposition::Replace);

        let state = ExportState::load(Path::new(&fx.config.state_file)).unwrap();
        assert_eq!(state.last_fetched_at, Some(at(5)));
        assert_eq!(state.mode, Some(ExportMode::Full));
        assert_eq!(state.rows, 0);
        assert_eq!(state.last_export, Some(at(6)));
    }

    fn stale_export(config: &ExportConfig, name: &str) -> PathBuf {
        std::fs::create_dir_all(&config.dir).unwrap();
        let path = Path::new(&config.dir).join(name);
        let file = std::fs::File::create(&path).unwrap();
        let month_ago = std::time::SystemTime::now() - std::time::Duration::from_secs(30 * 86_400);
        file.set_modified(month_ago).unwrap();
        path
    }

    #[tokio::test]
    async fn export_runs_finish_with_retention_pass() {
        let fx = fixture().await;
        let stale = stale_export(&fx.config, "posts_full_20251201_000000.parquet");
        fx.repo.upsert_posts(posts(&["A"]), at(1)).await.unwrap();

        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);
        let run = exporter.run(ExportMode::Full, 7, at(2)).await.unwrap();

        assert_eq!(run.removed, vec![stale.clone()]);
        assert!(!stale.exists());
        // the file just written is fresh and stays
        assert_eq!(exported_files(&fx.config), 1);

        // an incremental run with nothing new still cleans up
        let stale = stale_export(&fx.config, "posts_incr_20251202_000000.parquet");
        let run = exporter
            .run(ExportMode::Incremental, 7, at(3))
            .await
            .unwrap();
        assert_eq!(run.outcome, ExportOutcome::NothingToExport { since: at(1) });
        assert_eq!(run.removed, vec![stale]);
    }

    #[tokio::test]
    async fn cleanup_mode_only_removes_files() {
        let fx = fixture().await;
        let stale = stale_export(&fx.config, "posts_full_20251201_000000.parquet");

        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);
        let run = exporter.run(ExportMode::Cleanup, 7, at(2)).await.unwrap();

        assert_eq!(run.outcome, ExportOutcome::Cleaned);
        assert_eq!(run.removed, vec![stale]);
        assert_eq!(*warehouse.datasets_ensured.borrow(), 0);
        assert!(!Path::new(&fx.config.state_file).exists());
    }

    #[tokio::test]
    async fn schema_mode_skips_retention_pass() {
        let fx = fixture().await;
        let stale = stale_export(&fx.config, "posts_full_20251201_000000.parquet");

        let storage = FakeStorage::default();
        let warehouse = FakeWarehouse::default();
        let exporter = Exporter::new(&fx.repo, &fx.config, &storage, &warehouse);
        let run = exporter.run(ExportMode::Schema, 7, at(2)).await.unwrap();

        assert!(run.removed.is_empty());
        assert!(stale.exists());
    }
}
