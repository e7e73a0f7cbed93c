use std::path::PathBuf;

mod audit;
mod list;
mod run;
mod show;
mod status;
mod terminal;

use audit::Audit;
use clap::ArgAction;
use list::List;
use reqsmith::{
    domain::{Credential, ParseIdError, TestStep},
    store::RecordPatch,
    Actor, RecordId, RecordType, Workspace,
};
use run::Run;
use show::Show;
use status::Status;
use terminal::Colorize;
use tracing::instrument;

/// Parse a record id from a string, normalizing to uppercase.
///
/// This is a CLI boundary function that accepts lowercase input
/// and normalizes it before parsing.
fn parse_record_id(s: &str) -> Result<RecordId, String> {
    let uppercase = s.to_uppercase();
    uppercase
        .parse()
        .map_err(|e: ParseIdError| format!("{e}"))
}

/// Parse a test step of the form `ACTION -> EXPECTED`.
fn parse_step(s: &str) -> Result<TestStep, String> {
    let (action, expected) = s
        .split_once("->")
        .ok_or_else(|| format!("invalid step '{s}': expected 'ACTION -> EXPECTED'"))?;
    Ok(TestStep {
        action: action.trim().to_string(),
        expected: expected.trim().to_string(),
    })
}

/// Resolve the acting user from the environment.
///
/// Session mechanics are out of scope here; `REQS_USER`, `REQS_EMAIL`,
/// and `REQS_NAME` override the defaults.
fn current_actor() -> Actor {
    let id = std::env::var("REQS_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "local".to_string());
    let email = std::env::var("REQS_EMAIL").unwrap_or_else(|_| format!("{id}@localhost"));
    let name = std::env::var("REQS_NAME").unwrap_or_else(|_| id.clone());
    Actor::new(id, email, name)
}

/// Re-verify the actor's credential for a gated transition.
///
/// Verification itself is external to this tool; the prompt stands in
/// for it, and `--yes` skips the prompt entirely.
fn verify_credential(yes: bool) -> anyhow::Result<Credential> {
    if yes {
        return Ok(Credential::Verified);
    }
    let password = dialoguer::Password::new()
        .with_prompt("Signature password")
        .allow_empty_password(true)
        .interact()?;
    Ok(if password.trim().is_empty() {
        Credential::Rejected
    } else {
        Credential::Verified
    })
}

fn load_workspace(root: PathBuf) -> anyhow::Result<Workspace<reqsmith::storage::Loaded>> {
    Ok(Workspace::new(root).load_all()?)
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The path to the root of the workspace
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show workspace status (default)
    Status(Status),

    /// Initialize a new workspace
    Init,

    /// Create a new record (UR, SR, or TC)
    Create(Create),

    /// Edit a record or test run
    Edit(Edit),

    /// Approve a record
    ///
    /// Approval requires credential re-verification and stamps the
    /// record with a new revision.
    Approve(Approve),

    /// Soft-delete a record, run, or result
    Delete(Delete),

    /// Create a trace link between two records
    Link(Link),

    /// Remove a user-created trace link
    Unlink(Unlink),

    /// Show trace links upstream or downstream of a record
    Trace(Trace),

    /// Manage test runs
    #[command(subcommand)]
    Run(Run),

    /// Query the audit ledger
    #[command(subcommand)]
    Audit(Audit),

    /// Show detailed information about a record, run, or result
    Show(Show),

    /// List records, runs, and results
    List(List),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::Init => Init::run(root)?,
            Self::Create(command) => command.run(root)?,
            Self::Edit(command) => command.run(root)?,
            Self::Approve(command) => command.run(root)?,
            Self::Delete(command) => command.run(root)?,
            Self::Link(command) => command.run(root)?,
            Self::Unlink(command) => command.run(root)?,
            Self::Trace(command) => command.run(root)?,
            Self::Run(command) => command.run(root)?,
            Self::Audit(command) => command.run(root)?,
            Self::Show(command) => command.run(root)?,
            Self::List(command) => command.run(root)?,
        }
        Ok(())
    }
}

struct Init;

impl Init {
    #[instrument]
    fn run(root: PathBuf) -> anyhow::Result<()> {
        if root.join("config.toml").exists() {
            anyhow::bail!("Workspace already initialized (found existing config.toml)");
        }

        Workspace::init(root)?;
        println!("{}", "✅ Initialized empty workspace".success());
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Create {
    /// The kind of record to create (UR, SR, or TC)
    #[arg(value_parser = parse_kind)]
    kind: RecordType,

    /// The record title
    title: String,

    /// The record description
    #[arg(long, default_value = "")]
    description: String,

    /// Test steps of the form 'ACTION -> EXPECTED' (test cases only)
    #[arg(long = "step", value_parser = parse_step)]
    steps: Vec<TestStep>,
}

fn parse_kind(s: &str) -> Result<RecordType, String> {
    RecordType::from_prefix(&s.to_uppercase())
        .ok_or_else(|| format!("unknown record type '{s}': expected UR, SR, TC, TR, or TRES"))
}

impl Create {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let record = workspace.create_record(
            self.kind,
            &self.title,
            &self.description,
            self.steps,
            &current_actor(),
        )?;

        println!(
            "{}",
            format!("✅ Created {} {}", record.id().display(digits), record.title()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Edit {
    /// The record or run to edit
    #[arg(value_parser = parse_record_id)]
    id: RecordId,

    /// New title
    #[arg(long)]
    title: Option<String>,

    /// New description
    #[arg(long)]
    description: Option<String>,

    /// Replacement test steps of the form 'ACTION -> EXPECTED'
    #[arg(long = "step", value_parser = parse_step)]
    steps: Option<Vec<TestStep>>,

    /// Fail instead of prompting if the stored version differs
    #[arg(long, value_name = "N")]
    expected_version: Option<u64>,

    /// Skip the credential prompt (approved records only)
    #[arg(long, short)]
    yes: bool,
}

impl Edit {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let needs_credential = workspace
            .engine()
            .record(self.id)
            .is_some_and(|r| r.lifecycle().is_approved());
        let credential = if needs_credential {
            Some(verify_credential(self.yes)?)
        } else {
            None
        };

        let patch = RecordPatch {
            title: self.title,
            description: self.description,
            steps: self.steps,
        };
        workspace.edit_record(
            self.id,
            patch,
            &current_actor(),
            credential,
            self.expected_version,
        )?;

        println!(
            "{}",
            format!("✅ Updated {}", self.id.display(digits)).success()
        );
        if needs_credential {
            println!(
                "{}",
                "   The record reverted to draft and must be re-approved.".warning()
            );
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Approve {
    /// The record or run to approve
    #[arg(value_parser = parse_record_id)]
    id: RecordId,

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

        if self.id.kind() == RecordType::TestRun {
            let run = workspace.approve_test_run(
                self.id,
                &current_actor(),
                credential,
                self.expected_version,
            )?;
            let results = workspace.engine().iter_results().count();
            println!(
                "{}",
                format!(
                    "✅ Approved {} ({:?}) at revision {}; {results} result(s) on file",
                    self.id.display(digits),
                    run.overall_result(),
                    run.lifecycle().revision(),
                )
                .success()
            );
        } else {
            let revision = workspace.approve_record(
                self.id,
                &current_actor(),
                credential,
                self.expected_version,
            )?;
            println!(
                "{}",
                format!("✅ Approved {} at revision {revision}", self.id.display(digits))
                    .success()
            );
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Delete {
    /// The record, run, or result to delete
    #[arg(value_parser = parse_record_id)]
    id: RecordId,

    /// Fail instead of prompting if the stored version differs
    #[arg(long, value_name = "N")]
    expected_version: Option<u64>,

    /// Skip the credential prompt (approved aggregates only)
    #[arg(long, short)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let approved = match self.id.kind() {
            RecordType::TestRun => workspace
                .engine()
                .test_run(self.id)
                .is_some_and(|r| r.lifecycle().is_approved()),
            RecordType::TestResult => false,
            _ => workspace
                .engine()
                .record(self.id)
                .is_some_and(|r| r.lifecycle().is_approved()),
        };
        let credential = if approved {
            Some(verify_credential(self.yes)?)
        } else {
            None
        };

        workspace.delete_record(self.id, &current_actor(), credential, self.expected_version)?;

        println!(
            "{}",
            format!("✅ Deleted {} (id stays reserved)", self.id.display(digits)).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Link {
    /// The upstream record
    #[arg(value_parser = parse_record_id)]
    from: RecordId,

    /// The downstream record
    #[arg(value_parser = parse_record_id)]
    to: RecordId,
}

impl Link {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let link = workspace.add_trace_link(self.from, self.to, &current_actor())?;

        println!(
            "{}",
            format!(
                "✅ Linked {} -> {} ({})",
                self.from.display(digits),
                self.to.display(digits),
                link.id(),
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Unlink {
    /// The upstream record
    #[arg(value_parser = parse_record_id)]
    from: RecordId,

    /// The downstream record
    #[arg(value_parser = parse_record_id)]
    to: RecordId,
}

impl Unlink {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut workspace = load_workspace(root)?;
        let digits = workspace.config().digits();

        let link = workspace
            .engine()
            .downstream_of(self.from)?
            .into_iter()
            .find(|link| link.to().id == self.to)
            .map(reqsmith::TraceLink::id)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no link from {} to {}",
                    self.from.display(digits),
                    self.to.display(digits)
                )
            })?;

        workspace.remove_trace_link(link, &current_actor())?;

        println!(
            "{}",
            format!(
                "✅ Unlinked {} -> {}",
                self.from.display(digits),
                self.to.display(digits)
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Trace {
    /// The record to trace from
    #[arg(value_parser = parse_record_id)]
    id: RecordId,

    /// Show upstream links instead of downstream
    #[arg(long, short)]
    up: bool,
}

impl Trace {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let workspace = load_workspace(root)?;
        let digits = workspace.config().digits();
        let engine = workspace.engine();

        let links = if self.up {
            engine.upstream_of(self.id)?
        } else {
            engine.downstream_of(self.id)?
        };

        if links.is_empty() {
            let direction = if self.up { "upstream of" } else { "downstream of" };
            println!("No links {direction} {}.", self.id.display(digits));
            return Ok(());
        }

        for link in links {
            let origin = if link.is_system_generated() {
                "system".dim()
            } else {
                "user".to_string()
            };
            println!(
                "{} -> {}  [{origin}]",
                link.from().id.display(digits),
                link.to().id.display(digits),
            );
        }
        Ok(())
    }
}
