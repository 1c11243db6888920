//! Markdown reports over the local store.
//!
//! Rendering only reads. Publishing is a separate step in `app`, so a
//! report can always be previewed first.

mod digest;
mod pulse;

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::ReportConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{Post, Report, Stats, SubmoltActivity};
use crate::services::{ContextLookup, Lookup, SearchHit};

pub use digest::DigestTemplate;
pub use pulse::PulseTemplate;

/// Link builders for the platform's web pages.
#[derive(Debug, Clone)]
pub struct Links {
    base: String,
}

impl Links {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn post(&self, id: &str) -> String {
        format!("{}/post/{}", self.base, urlencoding::encode(id))
    }

    pub fn user(&self, name: &str) -> String {
        format!("{}/u/{}", self.base, urlencoding::encode(name))
    }

    pub fn submolt(&self, name: &str) -> String {
        format!("{}/m/{}", self.base, urlencoding::encode(name))
    }

    /// `by [author](...) in [m/submolt](...)`, skipping missing parts.
    pub fn byline(&self, post: &Post) -> String {
        let mut line = String::new();
        if let Some(author) = &post.author {
            line.push_str(&format!("by [{}]({})", author, self.user(author)));
        }
        if let Some(submolt) = &post.submolt {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!("in [m/{}]({})", submolt, self.submolt(submolt)));
        }
        line
    }

    pub fn title_link(&self, post: &Post) -> String {
        format!(
            "[{}]({})",
            post.title.as_deref().unwrap_or("(untitled)"),
            self.post(&post.id)
        )
    }
}

/// How much data a template wants pulled from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub top: usize,
    pub recent: usize,
    pub submolts: usize,
    /// Also hide platform accounts.
    pub exclude_platform: bool,
    /// Number of top posts to look up outside context for.
    pub context_for: usize,
}

/// Everything a template may render.
pub struct ReportData<'a> {
    pub date: NaiveDate,
    pub stats: Stats,
    pub top: Vec<Post>,
    pub recent: Vec<Post>,
    pub submolts: Vec<SubmoltActivity>,
    /// First search hit per post id, when enrichment ran and found one.
    pub context: HashMap<String, SearchHit>,
    pub links: &'a Links,
    pub reporter: &'a str,
}

pub trait ReportTemplate {
    fn selection(&self) -> Selection;
    fn render(&self, data: &ReportData<'_>) -> Report;
}

pub struct ReportGenerator<'a, L> {
    repo: &'a Repository,
    config: &'a ReportConfig,
    links: Links,
    lookup: Option<L>,
}

impl<'a, L: ContextLookup> ReportGenerator<'a, L> {
    /// `lookup` is the enrichment switch: `None` renders without outside context.
    pub fn new(repo: &'a Repository, config: &'a ReportConfig, lookup: Option<L>) -> Self {
        Self {
            repo,
            config,
            links: Links::new(&config.site_base),
            lookup,
        }
    }

    fn excluded(&self, selection: &Selection) -> Vec<String> {
        let mut excluded = self.config.denylist.clone();
        if selection.exclude_platform {
            excluded.extend(self.config.platform_authors.iter().cloned());
        }
        excluded
    }

    pub async fn generate(
        &self,
        template: &dyn ReportTemplate,
        date: NaiveDate,
    ) -> Result<Report> {
        let selection = template.selection();
        let excluded = self.excluded(&selection);

        let stats = self.repo.stats().await?;
        let top = if selection.top > 0 {
            self.repo
                .top_posts(selection.top, &excluded, self.config.engagement_weight)
                .await?
        } else {
            Vec::new()
        };
        let recent = if selection.recent > 0 {
            self.repo
                .recent_quality_posts(
                    selection.recent,
                    self.config.min_upvotes,
                    self.config.min_comments,
                    &excluded,
                )
                .await?
        } else {
            Vec::new()
        };
        let submolts = if selection.submolts > 0 {
            self.repo.active_submolts(selection.submolts).await?
        } else {
            Vec::new()
        };

        let (context, failed_lookups) = self.enrich(&top, selection.context_for).await;

        let data = ReportData {
            date,
            stats,
            top,
            recent,
            submolts,
            context,
            links: &self.links,
            reporter: &self.config.reporter,
        };
        let mut report = template.render(&data);
        report.failed_lookups = failed_lookups;
        Ok(report)
    }

    async fn enrich(&self, posts: &[Post], limit: usize) -> (HashMap<String, SearchHit>, usize) {
        let mut context = HashMap::new();
        let mut failed = 0;
        let Some(lookup) = &self.lookup else {
            return (context, failed);
        };

        for post in posts.iter().take(limit) {
            let Some(title) = post.title.as_deref() else {
                continue;
            };
            match lookup.lookup(title, 1).await {
                Lookup::Found(hits) => {
                    if let Some(hit) = hits.into_iter().next() {
                        context.insert(post.id.clone(), hit);
                    }
                }
                Lookup::Empty => {}
                Lookup::Failed(reason) => {
                    tracing::warn!("No context for post {}: {}", post.id, reason);
                    failed += 1;
                }
            }
        }
        (context, failed)
    }
}
