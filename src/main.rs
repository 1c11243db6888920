use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod app;
mod config;
mod db;
mod error;
mod export;
mod models;
mod platform;
mod report;
mod services;
mod sync;
mod util;

use app::App;
use config::Config;
use error::Result;
use export::{ExportOutcome, ExportRun};
use models::{ExportMode, Report};

#[derive(Parser)]
#[command(name = "molt-tracker", version, about = "Fetch, store, export and report on moltbook posts")]
struct Cli {
    /// Config file (default: <config dir>/molt-tracker/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch hot, new, rising and top posts into the local store
    Sync,
    /// Print store statistics as JSON
    Stats,
    /// Mark a post as curated
    Curate {
        id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List the most active authors
    Authors {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// List curated posts
    Curated {
        /// Only posts created on this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Export the store to the warehouse
    Export {
        #[arg(value_enum, default_value_t = ExportMode::Incremental)]
        mode: ExportMode,
        /// Days to keep old Parquet files
        #[arg(long)]
        keep_days: Option<u32>,
    },
    /// Render the daily digest
    Digest,
    /// Render and publish the daily digest
    PostDigest {
        #[arg(long)]
        submolt: Option<String>,
    },
    /// Render the community pulse
    Pulse {
        theme: Option<String>,
        /// Publish after rendering
        #[arg(long)]
        post: bool,
        #[arg(long, requires = "post")]
        submolt: Option<String>,
        /// Skip the web context lookups
        #[arg(long)]
        no_context: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("molt_tracker=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let app = App::new(&config).await?;

    match cli.command {
        Command::Sync => {
            let summary = app.sync().await?;
            let stats = &summary.stats;
            println!("\n✅ Synced! Stored {} posts", summary.stored());
            if summary.skipped() > 0 {
                println!("⚠️  Skipped {} malformed posts", summary.skipped());
            }
            println!(
                "📊 Total: {} posts | {} curated | {} authors | {} submolts",
                stats.total_posts, stats.curated, stats.unique_authors, stats.unique_submolts
            );
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&app.stats().await?)?);
        }
        Command::Curate { id, notes } => match app.curate(&id, notes).await? {
            Some(post) => println!(
                "Curated {}: {}",
                post.id,
                post.title.as_deref().unwrap_or("(untitled)")
            ),
            None => {
                return Err(anyhow::anyhow!("no post with id {}", id).into());
            }
        },
        Command::Authors { limit } => {
            println!("{}", serde_json::to_string_pretty(&app.active_authors(limit).await?)?);
        }
        Command::Curated { date } => {
            println!("{}", serde_json::to_string_pretty(&app.curated(date).await?)?);
        }
        Command::Export { mode, keep_days } => {
            print_export(&app.export(mode, keep_days).await?);
        }
        Command::Digest => {
            print_report("Digest", &app.render_digest().await?);
        }
        Command::PostDigest { submolt } => {
            let report = app.render_digest().await?;
            let response = app.publish(&report, submolt.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Pulse {
            theme,
            post,
            submolt,
            no_context,
        } => {
            let report = app.render_pulse(theme, !no_context).await?;
            if report.failed_lookups > 0 {
                tracing::warn!("{} context lookups failed", report.failed_lookups);
            }
            if post {
                let response = app.publish(&report, submolt.as_deref()).await?;
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_report("Pulse", &report);
            }
        }
    }

    Ok(())
}

fn print_report(kind: &str, report: &Report) {
    println!("=== Generated {} ===", kind);
    println!("Title: {}", report.title);
    println!("Submolt: {}", report.submolt);
    println!("\n{}", report.content);
}

fn print_export(run: &ExportRun) {
    let outcome = &run.outcome;
    match outcome {
        ExportOutcome::Exported {
            mode,
            file,
            uri,
            watermark,
            table_rows,
            ..
        } => {
            println!(
                "✅ {} export complete: {} rows ({} -> {})",
                mode,
                outcome.rows(),
                file.display(),
                uri
            );
            if let Some(watermark) = watermark {
                println!("Watermark: {}", watermark.to_rfc3339());
            }
            if let Some(total) = table_rows {
                println!("Warehouse table now holds {} rows", total);
            }
        }
        ExportOutcome::NothingToExport { since } => {
            println!("No new rows since {}", since.to_rfc3339());
        }
        ExportOutcome::SchemaChecked { table_exists } => {
            if *table_exists {
                println!("Dataset ready, table exists");
            } else {
                println!("Dataset ready, table will be created on first load");
            }
        }
        ExportOutcome::Cleaned => {}
    }
    if !run.removed.is_empty() || *outcome == ExportOutcome::Cleaned {
        println!("Removed {} old export files", run.removed.len());
    }
}
