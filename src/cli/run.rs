use std::path::PathBuf;

use clap::Parser;
use nonempty::NonEmpty;
use reqsmith::{domain::StepStatus, RecordId};
use tracing::instrument;

use super::{current_actor, load_workspace, parse_record_id, terminal::Colorize, verify_credential};

/// Subcommands for `reqs run`.
#[derive(Debug, Parser)]
pub enum Run {
    /// Create a new test run over a set of test cases
    Create(Create),

    /// Start (or restart) execution of a case within a run
    Exec(Exec),

    /// Record the outcome of a single step
    Record(Record),

    /// Approve a complete run, freezing it and materializing results
    Approve(Approve),
}

impl Run {
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Create(command) => command.run(root),
            Self::Exec(command) => command.run(root),
            Self::Record(command) => command.run(root),
            Self::Approve(command) => command.run(root),
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Create a new test run over a set of test cases")]
pub struct Create {
    /// The run title
    title: String,

    /// Test cases to execute, in order
    #[arg(required = true, value_parser = parse_record_id)]
    cases: Vec<RecordId>,

    /// The run description
    #[arg(long, default_value = "")]
    description: String,
}

impl Create {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let cases = NonEmpty::from_vec(self.cases)
            .ok_or_else(|| anyhow::anyhow!("at least one test case is required"))?;
        let run =
            workspace.create_test_run(&self.title, &self.description, &cases, &current_actor())?;

        println!(
            "{}",
            format!(
                "✅ Created {} over {} case(s)",
                run.id().display(digits),
                run.cases().len()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(about = "Start (or restart) execution of a case within a run")]
pub struct Exec {
    /// The test run
    #[arg(value_parser = parse_record_id)]
    run: RecordId,

    /// The test case within the run
    #[arg(value_parser = parse_record_id)]
    case: RecordId,

    /// Fail instead of prompting if the stored version differs
    #[arg(long, value_name = "N")]
    expected_version: Option<u64>,
}

impl Exec {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let case = workspace.execute_test_case(
            self.run,
            self.case,
            &current_actor(),
            self.expected_version,
        )?;

        println!(
            "{}",
            format!(
                "✅ Executing {} in {} ({} steps)",
                self.case.display(digits),
                self.run.display(digits),
                case.steps().len()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(about = "Record the outcome of a single step")]
pub struct Record {
    /// The test run
    #[arg(value_parser = parse_record_id)]
    run: RecordId,

    /// The test case within the run
    #[arg(value_parser = parse_record_id)]
    case: RecordId,

    /// 1-based step number
    step: usize,

    /// The observed status
    #[arg(value_enum)]
    status: Status,

    /// What was actually observed
    #[arg(long, default_value = "")]
    actual: String,

    /// Path or reference to supporting evidence
    #[arg(long)]
    evidence: Option<String>,

    /// Fail instead of prompting if the stored version differs
    #[arg(long, value_name = "N")]
    expected_version: Option<u64>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Status {
    Pass,
    Fail,
    /// Save observations without counting the step as executed
    NotExecuted,
}

impl From<Status> for StepStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Pass => Self::Pass,
            Status::Fail => Self::Fail,
            Status::NotExecuted => Self::NotExecuted,
        }
    }
}

impl Record {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let case = workspace.record_step_result(
            self.run,
            self.case,
            self.step,
            self.status.into(),
            &self.actual,
            self.evidence,
            &current_actor(),
            self.expected_version,
        )?;

        let state = format!(
            "step {} of {}: {:?} ({:?}/{:?})",
            self.step,
            case.steps().len(),
            self.status,
            case.status(),
            case.result()
        );
        match self.status {
            Status::Fail => println!("{}", state.failure()),
            Status::Pass => println!("{}", state.success()),
            _ => println!("{}", state.warning()),
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(about = "Approve a complete run, freezing it and materializing results")]
pub struct Approve {
    /// The test run
    #[arg(value_parser = parse_record_id)]
    run: RecordId,

    /// Fail instead of prompting if the stored version differs
    #[arg(long, value_name = "N")]
    expected_version: Option<u64>,

    /// Skip the credential prompt
    #[arg(long, short)]
    yes: bool,
}

impl Approve {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();
        let credential = verify_credential(self.yes)?;

        let run = workspace.approve_test_run(
            self.run,
            &current_actor(),
            credential,
            self.expected_version,
        )?;

        println!(
            "{}",
            format!(
                "✅ Approved {} ({:?}) at revision {}",
                self.run.display(digits),
                run.overall_result(),
                run.lifecycle().revision()
            )
            .success()
        );
        for result in workspace.engine().iter_results() {
            if result.run_id() == self.run {
                println!(
                    "   {} {:?} for {}",
                    result.id().display(digits),
                    result.result(),
                    result.test_case_id().display(digits)
                );
            }
        }
        Ok(())
    }
}
