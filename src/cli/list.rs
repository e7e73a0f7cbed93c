use std::path::PathBuf;

use clap::Parser;
use reqsmith::domain::ApprovalStatus;
use serde_json::json;
use tracing::instrument;

use super::{load_workspace, parse_kind, terminal::Colorize};
use reqsmith::RecordType;

/// Command arguments for `reqs list`.
#[derive(Debug, Parser)]
#[command(about = "List records, runs, and results")]
pub struct List {
    /// Filter by record kind (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',', value_name = "KIND", value_parser = parse_kind)]
    kind: Vec<RecordType>,

    /// Show only drafts
    #[arg(long, conflicts_with = "approved")]
    draft: bool,

    /// Show only approved entries
    #[arg(long)]
    approved: bool,

    /// Output format (default: table)
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Suppress headers and format rows for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

struct Row {
    id: String,
    kind: &'static str,
    status: String,
    revision: u32,
    title: String,
}

impl List {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let digits = workspace.config().digits();
        let engine = workspace.engine();

        let mut rows: Vec<Row> = Vec::new();

        if self.wants(RecordType::UserRequirement)
            || self.wants(RecordType::SystemRequirement)
            || self.wants(RecordType::TestCase)
        {
            for record in engine.iter_records() {
                if !self.wants(record.kind()) || !self.wants_status(record.status()) {
                    continue;
                }
                rows.push(Row {
                    id: record.id().display(digits).to_string(),
                    kind: record.kind().label(),
                    status: format!("{:?} r{}", record.status(), record.revision()),
                    revision: record.revision(),
                    title: record.title().to_string(),
                });
            }
        }

        if self.wants(RecordType::TestRun) {
            for run in engine.iter_runs() {
                if !self.wants_status(run.lifecycle().status()) {
                    continue;
                }
                let state = format!(
                    "{:?}/{:?} r{}",
                    run.status(),
                    run.overall_result(),
                    run.lifecycle().revision()
                );
                rows.push(Row {
                    id: run.id().display(digits).to_string(),
                    kind: run.id().kind().label(),
                    status: state,
                    revision: run.lifecycle().revision(),
                    title: run.title().to_string(),
                });
            }
        }

        if self.wants(RecordType::TestResult) && !self.draft {
            for result in engine.iter_results() {
                rows.push(Row {
                    id: result.id().display(digits).to_string(),
                    kind: result.id().kind().label(),
                    status: format!("{:?}", result.result()),
                    revision: 0,
                    title: format!(
                        "{} in {}",
                        result.test_case_id().display(digits),
                        result.run_id().display(digits)
                    ),
                });
            }
        }

        if rows.is_empty() {
            if !self.quiet {
                println!("Nothing matched.");
            }
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => {
                let entries: Vec<_> = rows
                    .iter()
                    .map(|row| {
                        json!({
                            "id": row.id,
                            "kind": row.kind,
                            "status": row.status,
                            "revision": row.revision,
                            "title": row.title,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Table => {
                if !self.quiet {
                    println!("{}", format!("{:<10} {:<18} {:<16} TITLE", "ID", "KIND", "STATUS").dim());
                }
                for row in &rows {
                    if self.quiet {
                        println!("{}", row.id);
                    } else {
                        println!("{:<10} {:<18} {:<16} {}", row.id, row.kind, row.status, row.title);
                    }
                }
            }
        }

        Ok(())
    }

    fn wants(&self, kind: RecordType) -> bool {
        self.kind.is_empty() || self.kind.contains(&kind)
    }

    fn wants_status(&self, status: ApprovalStatus) -> bool {
        if self.draft {
            status == ApprovalStatus::Draft
        } else if self.approved {
            status == ApprovalStatus::Approved
        } else {
            true
        }
    }
}
