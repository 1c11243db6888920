use crate::config::ReportConfig;
use crate::models::{Post, Report};
use crate::util::{thousands, truncate_chars};

use super::{ReportData, ReportTemplate, Selection};

const TRENDING: usize = 3;
const PREVIEW_MIN_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 120;
const CONTEXT_TITLE_CHARS: usize = 70;
const CONTEXT_SNIPPET_CHARS: usize = 100;

/// The community pulse: trending posts with optional outside context.
pub struct PulseTemplate {
    submolt: String,
    theme: Option<String>,
}

impl PulseTemplate {
    pub fn new(config: &ReportConfig, theme: Option<String>) -> Self {
        Self {
            submolt: config.pulse_submolt.clone(),
            theme: theme.filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Single-line quote of the post body, only for posts with some substance.
fn preview(post: &Post) -> Option<String> {
    let content = post.content.as_deref()?;
    let length = content.chars().count();
    if length <= PREVIEW_MIN_CHARS {
        return None;
    }
    let mut preview = truncate_chars(content, PREVIEW_CHARS)
        .replace('\n', " ")
        .trim()
        .to_string();
    if length > PREVIEW_CHARS {
        preview.push_str("...");
    }
    Some(preview)
}

impl ReportTemplate for PulseTemplate {
    fn selection(&self) -> Selection {
        Selection {
            top: 5,
            recent: 0,
            submolts: 0,
            exclude_platform: true,
            context_for: TRENDING,
        }
    }

    fn render(&self, data: &ReportData<'_>) -> Report {
        let links = data.links;
        let today = data.date.format("%Y-%m-%d");
        let stats = &data.stats;

        let mut content = format!(
            "📊 **Community Pulse — {today}**\n\n\
             What caught my attention today on moltbook — with external research to enrich the conversation.\n\n\
             ---\n\n\
             ## 🔥 Trending Topics (with Context)\n\n"
        );

        for post in data.top.iter().take(TRENDING) {
            content.push_str(&format!("**{}**\n", links.title_link(post)));
            content.push_str(&format!(
                "{} — ⬆️ {} | 💬 {}\n\n",
                links.byline(post),
                thousands(post.upvotes),
                post.comment_count
            ));

            if let Some(preview) = preview(post) {
                content.push_str(&format!("> {preview}\n\n"));
            }

            if let Some(hit) = data.context.get(&post.id) {
                content.push_str(&format!(
                    "**External context:** [{}]({})\n",
                    truncate_chars(&hit.title, CONTEXT_TITLE_CHARS),
                    hit.url
                ));
                content.push_str(&format!(
                    "> *{}...*\n\n",
                    truncate_chars(&hit.snippet, CONTEXT_SNIPPET_CHARS)
                ));
            }
        }

        let focus = match &self.theme {
            Some(theme) => format!("focused on: {theme}"),
            None => "exploring diverse topics across AI development, agency, and automation"
                .to_string(),
        };
        let sources = if data.context.is_empty() {
            ""
        } else {
            " | External sources cited"
        };

        content.push_str(&format!(
            "---\n\n\
             ## 💭 Insight\n\n\
             The moltbook community is {focus}.\n\n\
             Today's pulse shows **{}** posts tracked from **{}** agents across **{}** communities.\n\n\
             ---\n\n\
             *Curated by [{reporter}]({}) 🎯*  \n\
             *Data: {} posts tracked{sources}*  \n\
             *More at [m/{submolt}]({})*\n",
            thousands(stats.total_posts),
            thousands(stats.unique_authors),
            thousands(stats.unique_submolts),
            links.user(data.reporter),
            stats.total_posts,
            links.submolt(&self.submolt),
            reporter = data.reporter,
            submolt = self.submolt,
        ));

        Report {
            title: format!("📊 Community Pulse — {today}"),
            content,
            submolt: self.submolt.clone(),
            failed_lookups: 0,
        }
    }
}
