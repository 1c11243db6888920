use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::timestamp::{format_timestamp, parse_timestamp};
use crate::models::{
    AuthorActivity, IngestOutcome, IngestReport, NewPost, Post, SkippedPost, Stats,
    SubmoltActivity,
};

use super::schema::SCHEMA;

const POST_COLUMNS: &str = "id, title, content, author, submolt, url, upvotes, downvotes, \
                            comment_count, created_at, fetched_at, curated, notes";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Ingestion

    /// Insert-or-replace each record by id, stamping `fetched_at` with `fetched_at`.
    ///
    /// A record that fails to decode or to write is skipped; the rest of the
    /// batch still goes in. A re-fetch replaces the whole row, including
    /// `curated` and `notes`; only the rowid is kept.
    pub async fn upsert_posts(
        &self,
        records: Vec<serde_json::Value>,
        fetched_at: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let decoded: Vec<_> = records.into_iter().map(NewPost::from_json).collect();
        let fetched_at = format_timestamp(&fetched_at);

        let outcomes = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut outcomes = Vec::with_capacity(decoded.len());
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO posts (id, title, content, author, submolt, url, upvotes,
                                              downvotes, comment_count, created_at, fetched_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                           ON CONFLICT(id) DO UPDATE SET
                               title = excluded.title,
                               content = excluded.content,
                               author = excluded.author,
                               submolt = excluded.submolt,
                               url = excluded.url,
                               upvotes = excluded.upvotes,
                               downvotes = excluded.downvotes,
                               comment_count = excluded.comment_count,
                               created_at = excluded.created_at,
                               fetched_at = excluded.fetched_at,
                               curated = 0,
                               notes = NULL"#,
                    )?;

                    for record in decoded {
                        let post = match record {
                            Ok(post) => post,
                            Err(skip) => {
                                outcomes.push(IngestOutcome::Skipped(skip));
                                continue;
                            }
                        };
                        let written = stmt.execute(params![
                            post.id,
                            post.title,
                            post.content,
                            post.author,
                            post.submolt,
                            post.url,
                            post.upvotes,
                            post.downvotes,
                            post.comment_count,
                            post.created_at,
                            fetched_at,
                        ]);
                        outcomes.push(match written {
                            Ok(_) => IngestOutcome::Stored(post.id),
                            Err(e) => IngestOutcome::Skipped(SkippedPost {
                                id: Some(post.id),
                                reason: e.to_string(),
                            }),
                        });
                    }
                }
                tx.commit()?;
                Ok(outcomes)
            })
            .await?;

        let report = IngestReport { outcomes };
        for skip in report.skipped() {
            tracing::warn!(
                "Error storing post {}: {}",
                skip.id.as_deref().unwrap_or("<no id>"),
                skip.reason
            );
        }
        Ok(report)
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        let id = id.to_string();
        let post = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
                let post = stmt.query_row(params![id], post_from_row).optional()?;
                Ok(post)
            })
            .await?;
        Ok(post)
    }

    // Curation

    /// Returns false when no post has this id.
    pub async fn mark_curated(&self, id: &str, notes: Option<String>) -> Result<bool> {
        let id = id.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE posts SET curated = 1, notes = ?1 WHERE id = ?2",
                    params![notes, id],
                )?;
                Ok(n)
            })
            .await?;
        Ok(updated > 0)
    }

    pub async fn curated_posts(&self, date: Option<NaiveDate>) -> Result<Vec<Post>> {
        let date = date.map(|d| d.format("%Y-%m-%d").to_string());
        let posts = self
            .conn
            .call(move |conn| {
                let posts = match date {
                    Some(date) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {POST_COLUMNS} FROM posts \
                             WHERE curated = 1 AND date(created_at) = ?1 ORDER BY rowid"
                        ))?;
                        let rows = stmt.query_map(params![date], post_from_row)?;
                        rows.collect::<std::result::Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {POST_COLUMNS} FROM posts WHERE curated = 1 ORDER BY rowid"
                        ))?;
                        let rows = stmt.query_map([], post_from_row)?;
                        rows.collect::<std::result::Result<Vec<_>, _>>()?
                    }
                };
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    // Statistics

    pub async fn stats(&self) -> Result<Stats> {
        let stats = self
            .conn
            .call(|conn| {
                let stats = conn.query_row(
                    r#"SELECT COUNT(*),
                              COALESCE(SUM(curated), 0),
                              COUNT(DISTINCT author),
                              COUNT(DISTINCT submolt),
                              COALESCE(SUM(upvotes), 0),
                              COALESCE(SUM(comment_count), 0)
                       FROM posts"#,
                    [],
                    |row| {
                        Ok(Stats {
                            total_posts: row.get(0)?,
                            curated: row.get(1)?,
                            unique_authors: row.get(2)?,
                            unique_submolts: row.get(3)?,
                            total_upvotes: row.get(4)?,
                            total_comments: row.get(5)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }

    // Report queries

    /// Highest `upvotes + comment_count * weight` first; ties keep ingestion order.
    pub async fn top_posts(
        &self,
        limit: usize,
        excluded: &[String],
        weight: i64,
    ) -> Result<Vec<Post>> {
        let mut values = excluded_values(excluded);
        let clause = author_filter(excluded.len());
        values.push(Value::Integer(weight));
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE {clause} \
             ORDER BY (upvotes + comment_count * ?) DESC, rowid ASC LIMIT ?"
        );
        self.query_posts(sql, values).await
    }

    /// Newest first, limited to posts with some engagement.
    pub async fn recent_quality_posts(
        &self,
        limit: usize,
        min_upvotes: i64,
        min_comments: i64,
        excluded: &[String],
    ) -> Result<Vec<Post>> {
        let mut values = excluded_values(excluded);
        let clause = author_filter(excluded.len());
        values.push(Value::Integer(min_upvotes));
        values.push(Value::Integer(min_comments));
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE {clause} \
             AND (upvotes >= ? OR comment_count >= ?) \
             ORDER BY created_at DESC, rowid ASC LIMIT ?"
        );
        self.query_posts(sql, values).await
    }

    pub async fn active_submolts(&self, limit: usize) -> Result<Vec<SubmoltActivity>> {
        let submolts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT submolt, COUNT(*) AS count, COALESCE(SUM(upvotes), 0)
                       FROM posts
                       WHERE submolt IS NOT NULL
                       GROUP BY submolt
                       ORDER BY count DESC, submolt ASC
                       LIMIT ?1"#,
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| {
                    Ok(SubmoltActivity {
                        submolt: row.get(0)?,
                        posts: row.get(1)?,
                        total_upvotes: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(submolts)
    }

    pub async fn active_authors(
        &self,
        limit: usize,
        excluded: &[String],
    ) -> Result<Vec<AuthorActivity>> {
        let mut values = excluded_values(excluded);
        let clause = author_filter(excluded.len());
        values.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT author, COUNT(*) AS count, COALESCE(SUM(upvotes), 0) FROM posts \
             WHERE {clause} GROUP BY author ORDER BY count DESC, author ASC LIMIT ?"
        );
        let authors = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                    Ok(AuthorActivity {
                        author: row.get(0)?,
                        posts: row.get(1)?,
                        total_upvotes: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(authors)
    }

    // Export queries

    /// All posts, or only those fetched strictly after `after`.
    pub async fn posts_for_export(&self, after: Option<DateTime<Utc>>) -> Result<Vec<Post>> {
        match after {
            Some(watermark) => {
                let sql = format!(
                    "SELECT {POST_COLUMNS} FROM posts WHERE fetched_at > ? \
                     ORDER BY fetched_at ASC, rowid ASC"
                );
                self.query_posts(sql, vec![Value::Text(format_timestamp(&watermark))])
                    .await
            }
            None => {
                let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY rowid ASC");
                self.query_posts(sql, Vec::new()).await
            }
        }
    }

    pub async fn max_fetched_at(&self) -> Result<Option<DateTime<Utc>>> {
        let max: Option<String> = self
            .conn
            .call(|conn| {
                let max = conn.query_row("SELECT MAX(fetched_at) FROM posts", [], |row| {
                    row.get::<_, Option<String>>(0)
                })?;
                Ok(max)
            })
            .await?;
        Ok(max.and_then(|s| parse_timestamp(&s)))
    }

    async fn query_posts(&self, sql: String, values: Vec<Value>) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values.iter()), post_from_row)?;
                Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(posts)
    }
}

fn excluded_values(excluded: &[String]) -> Vec<Value> {
    excluded.iter().cloned().map(Value::Text).collect()
}

/// Posts without an author are never reported.
fn author_filter(excluded: usize) -> String {
    if excluded == 0 {
        return "author IS NOT NULL".to_string();
    }
    let placeholders = vec!["?"; excluded].join(",");
    format!("author IS NOT NULL AND author NOT IN ({placeholders})")
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        submolt: row.get(4)?,
        url: row.get(5)?,
        upvotes: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        downvotes: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        comment_count: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        created_at: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| parse_timestamp(&s)),
        fetched_at: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| parse_timestamp(&s)),
        curated: row.get::<_, Option<i64>>(11)?.unwrap_or(0) != 0,
        notes: row.get(12)?,
    })
}
