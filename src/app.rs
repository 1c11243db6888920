use std::path::Path;

use chrono::{NaiveDate, Utc};

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::export::{BqWarehouse, ExportRun, Exporter, GsutilStorage};
use crate::models::{AuthorActivity, ExportMode, Post, Report, Stats};
use crate::platform::{Credentials, PlatformClient};
use crate::report::{DigestTemplate, PulseTemplate, ReportGenerator};
use crate::services::WebSearch;
use crate::sync::{self, SyncSummary};

pub struct App<'a> {
    config: &'a Config,
    pub repository: Repository,
}

impl<'a> App<'a> {
    pub async fn new(config: &'a Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        Ok(Self { config, repository })
    }

    /// Credentials are only read by commands that talk to the platform.
    fn platform_client(&self) -> Result<PlatformClient> {
        let credentials = Credentials::load(Path::new(&self.config.credentials_path))?;
        PlatformClient::new(&self.config.api_base, credentials)
    }

    // Ingestion

    pub async fn sync(&self) -> Result<SyncSummary> {
        let client = self.platform_client()?;
        sync::sync(&client, &self.repository, self.config.fetch_limit).await
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.repository.stats().await
    }

    /// Returns the curated post, or `None` when the id is unknown.
    pub async fn curate(&self, id: &str, notes: Option<String>) -> Result<Option<Post>> {
        if !self.repository.mark_curated(id, notes).await? {
            return Ok(None);
        }
        self.repository.get_post(id).await
    }

    /// Authors with the most posts, platform accounts and denylist excluded.
    pub async fn active_authors(&self, limit: usize) -> Result<Vec<AuthorActivity>> {
        let report = &self.config.report;
        let mut excluded = report.denylist.clone();
        excluded.extend(report.platform_authors.iter().cloned());
        self.repository.active_authors(limit, &excluded).await
    }

    pub async fn curated(&self, date: Option<NaiveDate>) -> Result<Vec<Post>> {
        self.repository.curated_posts(date).await
    }

    // Export

    /// Run one export mode against the configured bucket and warehouse.
    pub async fn export(&self, mode: ExportMode, keep_days: Option<u32>) -> Result<ExportRun> {
        let export_config = &self.config.export;
        let keep_days = keep_days.unwrap_or(export_config.keep_days);
        let exporter = Exporter::new(
            &self.repository,
            export_config,
            GsutilStorage::new(export_config),
            BqWarehouse::new(export_config),
        );
        exporter.run(mode, keep_days, Utc::now()).await
    }

    // Reports

    pub async fn render_digest(&self) -> Result<Report> {
        let generator: ReportGenerator<'_, WebSearch> =
            ReportGenerator::new(&self.repository, &self.config.report, None);
        let template = DigestTemplate::new(&self.config.report);
        generator.generate(&template, Utc::now().date_naive()).await
    }

    pub async fn render_pulse(&self, theme: Option<String>, enrich: bool) -> Result<Report> {
        let lookup = if enrich && self.config.search.enabled {
            Some(WebSearch::new(&self.config.search)?)
        } else {
            None
        };
        let generator = ReportGenerator::new(&self.repository, &self.config.report, lookup);
        let template = PulseTemplate::new(&self.config.report, theme);
        generator.generate(&template, Utc::now().date_naive()).await
    }

    /// Post a rendered report, optionally to a different submolt.
    pub async fn publish(
        &self,
        report: &Report,
        submolt: Option<&str>,
    ) -> Result<serde_json::Value> {
        let client = self.platform_client()?;
        let publication = report.to_publication(submolt);
        tracing::info!(
            "Publishing \"{}\" to m/{}",
            publication.title,
            publication.submolt
        );
        client.publish(&publication).await
    }
}
