use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use reqsmith::{
    domain::{AuditFilter, EventCategory},
    RecordId,
};
use serde_json::json;
use tracing::instrument;

use super::{load_workspace, parse_record_id, terminal::Colorize};

/// Subcommands for `reqs audit`.
#[derive(Debug, Parser)]
pub enum Audit {
    /// Show the event trail, newest first
    Trail(Trail),

    /// Summarize activity per user
    Users(Users),

    /// Show per-day event counts
    Daily(Daily),
}

impl Audit {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Trail(command) => command.run(root),
            Self::Users(command) => command.run(root),
            Self::Daily(command) => command.run(root),
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Show the event trail, newest first")]
pub struct Trail {
    /// Only events about this record, run, or result
    #[arg(value_parser = parse_record_id)]
    id: Option<RecordId>,

    /// Only events in this category
    #[arg(long, value_enum)]
    category: Option<Category>,

    /// Only events by this actor id
    #[arg(long)]
    actor: Option<String>,

    /// Only events at or after this instant (RFC 3339)
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Only events strictly before this instant (RFC 3339)
    #[arg(long)]
    until: Option<DateTime<Utc>>,

    /// Maximum number of events to show
    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// Output format (default: table)
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Category {
    Requirements,
    Testing,
    Traceability,
}

impl From<Category> for EventCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::Requirements => Self::Requirements,
            Category::Testing => Self::Testing,
            Category::Traceability => Self::Traceability,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Trail {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let filter = AuditFilter {
            aggregate: self.id,
            category: self.category.map(Into::into),
            actor: self.actor.clone(),
            since: self.since,
            until: self.until,
        };
        let mut events = workspace.engine().audit_trail(&filter);
        events.reverse();
        events.truncate(self.limit);

        if events.is_empty() {
            println!("No events matched.");
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => {
                let entries: Vec<_> = events
                    .iter()
                    .map(|event| {
                        json!({
                            "sequence": event.sequence,
                            "occurred_at": event.occurred_at,
                            "event": event.name(),
                            "aggregate": event.aggregate_id.display(digits).to_string(),
                            "actor": event.actor.id,
                            "payload": event.payload,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Table => {
                for event in events {
                    println!(
                        "{}  {:<10} {:<32} {}",
                        event.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string().dim(),
                        event.aggregate_id.display(digits),
                        event.name(),
                        event.actor.name.dim()
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(about = "Summarize activity per user")]
pub struct Users {}

impl Users {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let summary = workspace.engine().audit().user_activity_summary();

        if summary.is_empty() {
            println!("No activity yet.");
            return Ok(());
        }

        println!("{}", format!("{:<16} {:>7}  FIRST                 LAST", "USER", "EVENTS").dim());
        for user in summary {
            println!(
                "{:<16} {:>7}  {}  {}",
                user.name,
                user.events,
                user.first_activity.format("%Y-%m-%d %H:%M:%S"),
                user.last_activity.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(about = "Show per-day event counts")]
pub struct Daily {}

impl Daily {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let metrics = workspace.engine().audit().daily_metrics();

        if metrics.is_empty() {
            println!("No activity yet.");
            return Ok(());
        }

        for day in metrics {
            let breakdown: Vec<String> = day
                .by_category
                .iter()
                .map(|(category, count)| format!("{category:?}: {count}"))
                .collect();
            println!(
                "{}  {:>5}  {}",
                day.date,
                day.total,
                breakdown.join(", ").dim()
            );
        }
        Ok(())
    }
}
