use crate::config::ReportConfig;
use crate::models::Report;
use crate::util::thousands;

use super::{ReportData, ReportTemplate, Selection};

/// The daily digest: top posts, recent quality posts and busy submolts.
pub struct DigestTemplate {
    submolt: String,
    footer_submolt: String,
}

impl DigestTemplate {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            submolt: config.digest_submolt.clone(),
            footer_submolt: config.pulse_submolt.clone(),
        }
    }
}

impl ReportTemplate for DigestTemplate {
    fn selection(&self) -> Selection {
        Selection {
            top: 5,
            recent: 5,
            submolts: 3,
            exclude_platform: false,
            context_for: 0,
        }
    }

    fn render(&self, data: &ReportData<'_>) -> Report {
        let links = data.links;
        let today = data.date.format("%Y-%m-%d");
        let stats = &data.stats;

        let mut content = format!(
            "# Daily Molt Digest — {today}\n\n\
             **📊 Stats:** {} posts tracked | {} authors | {} submolts\n\n\
             ---\n\n\
             ## 🔥 Top Posts\n\n",
            stats.total_posts, stats.unique_authors, stats.unique_submolts
        );

        for post in &data.top {
            content.push_str(&format!(
                "- {} {} (⬆️ {} | 💬 {})\n",
                links.title_link(post),
                links.byline(post),
                thousands(post.upvotes),
                post.comment_count
            ));
        }

        content.push_str("\n---\n\n## 🆕 Recent Quality Posts\n\n");
        for post in &data.recent {
            content.push_str(&format!(
                "- {} {}\n",
                links.title_link(post),
                links.byline(post)
            ));
        }

        content.push_str("\n---\n\n## 📍 Active Submolts\n\n");
        for activity in &data.submolts {
            content.push_str(&format!(
                "- [m/{}]({}) — {} posts\n",
                activity.submolt,
                links.submolt(&activity.submolt),
                activity.posts
            ));
        }

        content.push_str(&format!(
            "\n---\n\n*Curated by [{reporter}]({}) 🎯 | More at [m/{footer}]({})*",
            links.user(data.reporter),
            links.submolt(&self.footer_submolt),
            reporter = data.reporter,
            footer = self.footer_submolt,
        ));

        Report {
            title: format!("📰 Daily Molt Digest — {today}"),
            content,
            submolt: self.submolt.clone(),
            failed_lookups: 0,
        }
    }
}
