use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post as returned by the moltbook API.
///
/// Only `id` is required; everything else is optional on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePost {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<NamedRef>,
    #[serde(default)]
    pub submolt: Option<NamedRef>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub upvotes: Option<i64>,
    #[serde(default)]
    pub downvotes: Option<i64>,
    #[serde(default)]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

/// Row payload for an upsert into `posts`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub submolt: Option<String>,
    pub url: Option<String>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub created_at: Option<String>,
}

impl From<RemotePost> for NewPost {
    fn from(post: RemotePost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            author: post.author.and_then(|a| a.name),
            submolt: post.submolt.and_then(|s| s.name),
            url: post.url,
            upvotes: post.upvotes.unwrap_or(0),
            downvotes: post.downvotes.unwrap_or(0),
            comment_count: post.comment_count.unwrap_or(0),
            created_at: post.created_at,
        }
    }
}

impl NewPost {
    /// Decode one raw API record. Malformed records are reported back as the
    /// reason they were skipped, together with whatever id could be read.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SkippedPost> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from);
        serde_json::from_value::<RemotePost>(value)
            .map(NewPost::from)
            .map_err(|e| SkippedPost {
                id,
                reason: e.to_string(),
            })
    }
}

/// A full row of the `posts` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub submolt: Option<String>,
    pub url: Option<String>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub curated: bool,
    pub notes: Option<String>,
}

/// A record that could not be written, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPost {
    pub id: Option<String>,
    pub reason: String,
}

/// Per-record outcome of an ingestion batch.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored(String),
    Skipped(SkippedPost),
}

/// Result of writing one batch of fetched posts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Stored(_)))
            .count()
    }

    pub fn stored_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                IngestOutcome::Stored(id) => Some(id.as_str()),
                IngestOutcome::Skipped(_) => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<&SkippedPost> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                IngestOutcome::Skipped(skip) => Some(skip),
                IngestOutcome::Stored(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmoltActivity {
    pub submolt: String,
    pub posts: i64,
    pub total_upvotes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorActivity {
    pub author: String,
    pub posts: i64,
    pub total_upvotes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_posts: i64,
    pub curated: i64,
    pub unique_authors: i64,
    pub unique_submolts: i64,
    pub total_upvotes: i64,
    pub total_comments: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_names_and_default_counts() {
        let post = NewPost::from_json(json!({
            "id": "p1",
            "title": "Hello",
            "author": {"name": "alice"},
            "submolt": {"name": "general", "id": 7},
            "upvotes": 12,
            "created_at": "2026-01-30T09:00:00Z"
        }))
        .unwrap();

        assert_eq!(post.author.as_deref(), Some("alice"));
        assert_eq!(post.submolt.as_deref(), Some("general"));
        assert_eq!(post.upvotes, 12);
        assert_eq!(post.downvotes, 0);
        assert_eq!(post.comment_count, 0);
    }

    #[test]
    fn null_author_is_tolerated() {
        let post = NewPost::from_json(json!({"id": "p2", "author": null})).unwrap();
        assert_eq!(post.author, None);
    }

    #[test]
    fn missing_id_is_skipped() {
        let skip = NewPost::from_json(json!({"title": "orphan"})).unwrap_err();
        assert_eq!(skip.id, None);
        assert!(skip.reason.contains("id"));
    }

    #[test]
    fn malformed_count_keeps_id_in_skip() {
        let skip = NewPost::from_json(json!({"id": "p3", "upvotes": "many"})).unwrap_err();
        assert_eq!(skip.id.as_deref(), Some("p3"));
    }
}
