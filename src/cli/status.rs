use std::{collections::BTreeMap, path::PathBuf, process};

use clap::Parser;
use tracing::instrument;

use super::{load_workspace, terminal::Colorize};

#[derive(Debug, Parser, Default)]
#[command(about = "Show record counts, run states, and stale approvals")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let digits = workspace.config().digits();
        let engine = workspace.engine();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut approved = 0_usize;
        let mut stale: Vec<String> = Vec::new();
        for record in engine.iter_records() {
            *counts.entry(record.kind().label().to_string()).or_insert(0) += 1;
            if record.lifecycle().is_approved() {
                approved += 1;
                if !record.is_content_consistent() {
                    stale.push(record.id().display(digits).to_string());
                }
            }
        }

        let total: usize = counts.values().sum();
        let open_runs = engine.iter_runs().filter(|run| !run.is_frozen()).count();
        let frozen_runs = engine.iter_runs().filter(|run| run.is_frozen()).count();
        let events = engine.audit().len();

        if total == 0 && open_runs == 0 && frozen_runs == 0 {
            println!("No records found yet. Create one with 'reqs create'.");
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => {
                Self::output_json(&counts, total, approved, open_runs, frozen_runs, events, &stale)?;
            }
            OutputFormat::Table => {
                if self.quiet {
                    println!("{total} {approved} {open_runs} {frozen_runs} {}", stale.len());
                } else {
                    Self::output_table(&counts, total, approved, open_runs, frozen_runs, events, &stale);
                }
            }
        }

        // Exit with a non-zero code when the workspace needs attention.
        if !stale.is_empty() {
            process::exit(2);
        }

        Ok(())
    }

    fn output_json(
        counts: &BTreeMap<String, usize>,
        total: usize,
        approved: usize,
        open_runs: usize,
        frozen_runs: usize,
        events: usize,
        stale: &[String],
    ) -> anyhow::Result<()> {
        use serde_json::json;

        let kinds: Vec<_> = counts
            .iter()
            .map(|(kind, count)| json!({ "kind": kind, "count": count }))
            .collect();

        let output = json!({
            "kinds": kinds,
            "total": total,
            "approved": approved,
            "draft": total - approved,
            "open_runs": open_runs,
            "frozen_runs": frozen_runs,
            "audit_events": events,
            "stale_approvals": stale,
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_table(
        counts: &BTreeMap<String, usize>,
        total: usize,
        approved: usize,
        open_runs: usize,
        frozen_runs: usize,
        events: usize,
        stale: &[String],
    ) {
        let narrow = super::terminal::is_narrow();

        println!("Records ({total} total, {approved} approved):");
        for (kind, count) in counts {
            if narrow {
                println!("  {kind}: {count}");
            } else {
                println!("  {kind:<20} {count:>5}");
            }
        }
        println!();
        println!("Test runs: {open_runs} open, {frozen_runs} approved");
        println!("{}", format!("Audit events: {events}").dim());

        if stale.is_empty() {
            println!("{}", "✅ All approvals match their recorded content.".success());
        } else {
            println!(
                "{}",
                format!(
                    "⚠️  {} approved record(s) changed on disk since approval: {}",
                    stale.len(),
                    stale.join(", ")
                )
                .warning()
            );
        }
    }
}
