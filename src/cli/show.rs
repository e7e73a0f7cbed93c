use std::path::PathBuf;

use clap::Parser;
use reqsmith::{RecordId, RecordType};
use tracing::instrument;

use super::{load_workspace, parse_record_id, terminal::Colorize};

/// Command arguments for `reqs show`.
#[derive(Debug, Parser)]
#[command(about = "Show detailed information about a record, run, or result")]
pub struct Show {
    /// The record, run, or result to show
    #[arg(value_parser = parse_record_id)]
    id: RecordId,
}

impl Show {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let digits = workspace.config().digits();
        let engine = workspace.engine();

        match self.id.kind() {
            RecordType::TestRun => self.show_run(engine, digits)?,
            RecordType::TestResult => self.show_result(engine, digits)?,
            _ => self.show_record(engine, digits)?,
        }

        let upstream = engine.upstream_of(self.id).unwrap_or_default();
        let downstream = engine.downstream_of(self.id).unwrap_or_default();
        if !upstream.is_empty() || !downstream.is_empty() {
            println!();
            println!("{}", "Trace:".dim());
            for link in upstream {
                println!("  <- {}", link.from().id.display(digits));
            }
            for link in downstream {
                let marker = if link.is_system_generated() { " [system]" } else { "" };
                println!("  -> {}{}", link.to().id.display(digits), marker.dim());
            }
        }

        Ok(())
    }

    fn show_record(&self, engine: &reqsmith::Engine, digits: usize) -> anyhow::Result<()> {
        let record = engine
            .record(self.id)
            .ok_or_else(|| anyhow::anyhow!("{} not found", self.id.display(digits)))?;

        println!("{} {}", record.id().display(digits), record.title());
        println!(
            "{}",
            format!(
                "{} · {:?} · revision {} · version {}",
                record.kind().label(),
                record.status(),
                record.revision(),
                record.version()
            )
            .dim()
        );
        if record.is_deleted() {
            println!("{}", "Deleted.".warning());
        }
        if let Some(approval) = record.lifecycle().approval() {
            let consistent = if record.is_content_consistent() {
                "content matches".success()
            } else {
                "content changed since approval".warning()
            };
            println!("Approved by {} at {} ({consistent})", approval.by.name, approval.at);
        }
        println!(
            "{}",
            format!(
                "Created by {} at {}; last modified by {} at {}",
                record.created_by().name,
                record.created_at(),
                record.modified_by().name,
                record.modified_at()
            )
            .dim()
        );
        if !record.description().is_empty() {
            println!();
            println!("{}", record.description());
        }
        if !record.steps().is_empty() {
            println!();
            println!("Steps:");
            for (i, step) in record.steps().iter().enumerate() {
                println!("  {}. {} -> {}", i + 1, step.action, step.expected);
            }
        }
        Ok(())
    }

    fn show_run(&self, engine: &reqsmith::Engine, digits: usize) -> anyhow::Result<()> {
        let run = engine
            .test_run(self.id)
            .ok_or_else(|| anyhow::anyhow!("{} not found", self.id.display(digits)))?;

        println!("{} {}", run.id().display(digits), run.title());
        println!(
            "{}",
            format!(
                "Test run · {:?}/{:?} · revision {} · version {}",
                run.status(),
                run.overall_result(),
                run.lifecycle().revision(),
                run.version()
            )
            .dim()
        );
        if run.is_frozen() {
            println!("{}", "Approved and frozen.".success());
        }
        if run.is_deleted() {
            println!("{}", "Deleted.".warning());
        }
        if !run.description().is_empty() {
            println!();
            println!("{}", run.description());
        }
        println!();
        println!("Cases:");
        for case in run.cases() {
            let line = format!(
                "  {}  {:?}/{:?}  ({} of {} steps recorded)",
                case.test_case_id().display(digits),
                case.status(),
                case.result(),
                case.step_results().len(),
                case.steps().len()
            );
            match case.result() {
                reqsmith::domain::CaseResult::Fail => println!("{}", line.failure()),
                reqsmith::domain::CaseResult::Pass => println!("{}", line.success()),
                reqsmith::domain::CaseResult::Pending => println!("{line}"),
            }
        }
        Ok(())
    }

    fn show_result(&self, engine: &reqsmith::Engine, digits: usize) -> anyhow::Result<()> {
        let result = engine
            .test_result(self.id)
            .ok_or_else(|| anyhow::anyhow!("{} not found", self.id.display(digits)))?;

        println!(
            "{}  {:?}",
            result.id().display(digits),
            result.result()
        );
        println!(
            "{}",
            format!(
                "Verdict of {} in {} · recorded at {}",
                result.test_case_id().display(digits),
                result.run_id().display(digits),
                result.created_at()
            )
            .dim()
        );
        if result.is_deleted() {
            println!("{}", "Deleted.".warning());
        }
        Ok(())
    }
}
