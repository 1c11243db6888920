//! Pulls every feed ordering from the platform into the local store.
//!
//! A failing fetch or store aborts the remaining orderings; rows already
//! written by earlier orderings stay.

use chrono::Utc;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{IngestReport, Stats};
use crate::platform::{PostSource, SortOrder};

#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub per_sort: Vec<(SortOrder, IngestReport)>,
    pub stats: Stats,
}

impl SyncSummary {
    pub fn stored(&self) -> usize {
        self.per_sort.iter().map(|(_, report)| report.stored()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.per_sort
            .iter()
            .map(|(_, report)| report.skipped().len())
            .sum()
    }
}

/// Fetch one ordering and upsert it.
pub async fn fetch_sort<S: PostSource>(
    source: &S,
    repo: &Repository,
    sort: SortOrder,
    limit: u32,
) -> Result<IngestReport> {
    tracing::info!("Fetching {} posts...", sort);
    let posts = source.fetch_posts(sort, limit, None).await?;
    let report = repo.upsert_posts(posts, Utc::now()).await?;
    tracing::debug!("{}: stored {:?}", sort, report.stored_ids());
    Ok(report)
}

pub async fn sync<S: PostSource>(source: &S, repo: &Repository, limit: u32) -> Result<SyncSummary> {
    let mut per_sort = Vec::with_capacity(SortOrder::ALL.len());
    for sort in SortOrder::ALL {
        let report = fetch_sort(source, repo, sort, limit).await?;
        per_sort.push((sort, report));
    }

    let stats = repo.stats().await?;
    Ok(SyncSummary { per_sort, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;
    use std::cell::RefCell;

    struct FakeSource {
        fail_on: Option<SortOrder>,
        calls: RefCell<Vec<(SortOrder, u32)>>,
    }

    impl FakeSource {
        fn new(fail_on: Option<SortOrder>) -> Self {
            Self {
                fail_on,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PostSource for FakeSource {
        async fn fetch_posts(
            &self,
            sort: SortOrder,
            limit: u32,
            _submolt: Option<&str>,
        ) -> Result<Vec<serde_json::Value>> {
            self.calls.borrow_mut().push((sort, limit));
            if self.fail_on == Some(sort) {
                return Err(AppError::PlatformApi("boom".to_string()));
            }
            // "shared" shows up in every ordering
            Ok(vec![
                json!({"id": "shared", "author": {"name": "alice"}, "upvotes": 3}),
                json!({"id": format!("only-{}", sort), "author": {"name": "bob"}}),
                json!({"title": "broken"}),
            ])
        }
    }

    #[tokio::test]
    async fn syncs_all_four_orderings() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap();
        let source = FakeSource::new(None);

        let summary = sync(&source, &repo, 25).await.unwrap();

        let calls = source.calls.borrow();
        assert_eq!(
            calls.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            SortOrder::ALL.to_vec()
        );
        assert!(calls.iter().all(|(_, limit)| *limit == 25));
        assert_eq!(summary.stored(), 8);
        assert_eq!(summary.skipped(), 4);
        assert_eq!(summary.stats.total_posts, 5);
    }

    #[tokio::test]
    async fn failing_ordering_aborts_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap();
        let source = FakeSource::new(Some(SortOrder::Rising));

        let result = sync(&source, &repo, 50).await;

        assert!(matches!(result, Err(AppError::PlatformApi(_))));
        assert_eq!(source.calls.borrow().len(), 3);
        // hot and new were already written
        assert_eq!(repo.stats().await.unwrap().total_posts, 3);
    }
}
