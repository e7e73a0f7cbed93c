//! A filesystem backed workspace.
//!
//! The [`Workspace`] wraps the filesystem agnostic [`Engine`], loading
//! all state from disk up front and persisting every command's effects
//! in the same call: the files of the touched aggregates, the trace link
//! snapshot, and the audit journal delta.

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;
use walkdir::WalkDir;

use crate::{
    domain::{
        Actor, AuditLog, AuditPayload, Config, Credential, LinkId, Record, RecordId, RecordType,
        StepStatus, TestResult, TestRun, TestRunCase, TestStep, TraceLink,
    },
    storage::{
        journal::{self, JournalError},
        markdown::MarkdownRecord,
        run_file::{self, MarkdownRun},
    },
    store::{CommandError, Engine, RecordPatch, Registry},
};

const CONFIG_FILE: &str = "config.toml";
const RECORDS_DIR: &str = "records";
const RUNS_DIR: &str = "runs";
const RESULTS_DIR: &str = "results";
const LINKS_FILE: &str = "links.json";
const JOURNAL_FILE: &str = "audit.jsonl";

/// State of a workspace whose files have been loaded.
#[derive(Debug)]
pub struct Loaded {
    engine: Engine,
    config: Config,
}

/// State of a workspace that has not been loaded yet.
#[derive(Debug, PartialEq, Eq)]
pub struct Unloaded;

/// A filesystem backed workspace of records, runs, results, links, and
/// the audit journal.
#[derive(Debug)]
pub struct Workspace<S> {
    /// The workspace root directory.
    root: PathBuf,
    state: S,
}

/// Errors that can occur when persisting workspace state.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The command itself was rejected; nothing was persisted.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// A file could not be written.
    #[error("failed to persist workspace state")]
    Io(#[from] io::Error),
    /// The journal or link snapshot could not be written.
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// The configuration could not be saved.
    #[error("failed to save config: {0}")]
    Config(String),
}

/// Errors that can occur when loading a workspace from disk.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceLoadError {
    /// Files in the workspace directories could not be recognised, and
    /// the configuration does not tolerate that.
    UnrecognisedFiles(Vec<PathBuf>),
    /// The audit journal or link snapshot could not be read.
    Journal(#[from] JournalError),
}

impl fmt::Display for WorkspaceLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognisedFiles(paths) => {
                write!(f, "Unrecognised files: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::Journal(e) => write!(f, "{e}"),
        }
    }
}

impl Workspace<Unloaded> {
    /// Opens a workspace at the given path.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: Unloaded,
        }
    }

    /// Initializes an empty workspace: creates the directory layout and
    /// writes a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the config file cannot be
    /// created.
    pub fn init(root: PathBuf) -> Result<Workspace<Loaded>, WorkspaceError> {
        for dir in [RECORDS_DIR, RUNS_DIR, RESULTS_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        let config = Config::default();
        config
            .save(&root.join(CONFIG_FILE))
            .map_err(WorkspaceError::Config)?;

        Ok(Workspace {
            root,
            state: Loaded {
                engine: Engine::new(),
                config,
            },
        })
    }

    /// Loads all workspace state from disk.
    ///
    /// If `allow_unrecognised` is `true` in the configuration, files
    /// whose names or contents cannot be parsed are skipped; otherwise
    /// any unrecognised file fails the load.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecognised files, or if the journal or link
    /// snapshot cannot be read.
    #[instrument(skip(self))]
    pub fn load_all(self) -> Result<Workspace<Loaded>, WorkspaceLoadError> {
        let config = load_config(&self.root);

        let record_paths = collect_paths(&self.root.join(RECORDS_DIR), "md");
        let (records, unrecognised): (Vec<_>, Vec<_>) = record_paths
            .par_iter()
            .map(|path| try_load_record(path))
            .partition(Result::is_ok);
        let records: Vec<Record> = records.into_iter().map(Result::unwrap).collect();
        let mut unrecognised: Vec<PathBuf> =
            unrecognised.into_iter().map(Result::unwrap_err).collect();

        let run_paths = collect_paths(&self.root.join(RUNS_DIR), "md");
        let (runs, run_failures): (Vec<_>, Vec<_>) = run_paths
            .par_iter()
            .map(|path| try_load_run(path))
            .partition(Result::is_ok);
        let runs: Vec<TestRun> = runs.into_iter().map(Result::unwrap).collect();

        let result_paths = collect_paths(&self.root.join(RESULTS_DIR), "yaml");
        let (results, result_failures): (Vec<_>, Vec<_>) = result_paths
            .par_iter()
            .map(|path| try_load_result(path))
            .partition(Result::is_ok);
        let results: Vec<TestResult> = results.into_iter().map(Result::unwrap).collect();

        unrecognised.extend(run_failures.into_iter().map(Result::unwrap_err));
        unrecognised.extend(result_failures.into_iter().map(Result::unwrap_err));

        if !config.allow_unrecognised && !unrecognised.is_empty() {
            return Err(WorkspaceLoadError::UnrecognisedFiles(unrecognised));
        }

        let mut registry = Registry::with_capacity(records.len());
        for record in records {
            registry.insert_record(record);
        }
        for run in runs {
            registry.insert_run(run);
        }
        for result in results {
            registry.insert_result(result);
        }
        for link in journal::load_links(&self.root.join(LINKS_FILE))? {
            registry.insert_link(link);
        }

        let audit = AuditLog::from_events(journal::load_events(&self.root.join(JOURNAL_FILE))?);

        Ok(Workspace {
            root: self.root,
            state: Loaded {
                engine: Engine::from_parts(registry, audit),
                config,
            },
        })
    }
}

impl Workspace<Loaded> {
    /// The command/query engine, for read-only queries.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.state.engine
    }

    /// The workspace configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.state.config
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a draft record and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn create_record(
        &mut self,
        kind: RecordType,
        title: &str,
        description: &str,
        steps: Vec<TestStep>,
        actor: &Actor,
    ) -> Result<Record, WorkspaceError> {
        self.commit(|engine| {
            engine
                .create_record(kind, title, description, steps, actor)
                .map(Record::clone)
        })
    }

    /// Edits a record and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn edit_record(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), WorkspaceError> {
        self.commit(|engine| engine.edit_record(id, patch, actor, credential, expected_version))
    }

    /// Approves a record and persists it. Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn approve_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Credential,
        expected_version: Option<u64>,
    ) -> Result<u32, WorkspaceError> {
        self.commit(|engine| engine.approve_record(id, actor, credential, expected_version))
    }

    /// Soft-deletes a record and persists the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn delete_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), WorkspaceError> {
        self.commit(|engine| engine.delete_record(id, actor, credential, expected_version))
    }

    /// Creates a draft test run and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn create_test_run(
        &mut self,
        title: &str,
        description: &str,
        test_cases: &NonEmpty<RecordId>,
        actor: &Actor,
    ) -> Result<TestRun, WorkspaceError> {
        self.commit(|engine| {
            engine
                .create_test_run(title, description, test_cases, actor)
                .map(TestRun::clone)
        })
    }

    /// Begins (or restarts) execution of a case and persists the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn execute_test_case(
        &mut self,
        run_id: RecordId,
        test_case_id: RecordId,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<TestRunCase, WorkspaceError> {
        self.commit(|engine| {
            engine
                .execute_test_case(run_id, test_case_id, actor, expected_version)
                .map(TestRunCase::clone)
        })
    }

    /// Records a step result and persists the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    #[allow(clippy::too_many_arguments)]
    pub fn record_step_result(
        &mut self,
        run_id: RecordId,
        test_case_id: RecordId,
        step: usize,
        status: StepStatus,
        actual_result: &str,
        evidence_file: Option<String>,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<TestRunCase, WorkspaceError> {
        self.commit(|engine| {
            engine
                .record_step_result(
                    run_id,
                    test_case_id,
                    step,
                    status,
                    actual_result,
                    evidence_file,
                    actor,
                    expected_version,
                )
                .map(TestRunCase::clone)
        })
    }

    /// Approves a complete test run, persisting the frozen run, its
    /// materialized results, the link snapshot, and the events.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn approve_test_run(
        &mut self,
        run_id: RecordId,
        actor: &Actor,
        credential: Credential,
        expected_version: Option<u64>,
    ) -> Result<TestRun, WorkspaceError> {
        self.commit(|engine| {
            engine
                .approve_test_run(run_id, actor, credential, expected_version)
                .map(TestRun::clone)
        })
    }

    /// Creates a trace link and persists the link snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn add_trace_link(
        &mut self,
        from: RecordId,
        to: RecordId,
        actor: &Actor,
    ) -> Result<TraceLink, WorkspaceError> {
        self.commit(|engine| engine.add_trace_link(from, to, actor).map(TraceLink::clone))
    }

    /// Removes a user-created trace link and persists the link snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or persisting fails.
    pub fn remove_trace_link(
        &mut self,
        link: LinkId,
        actor: &Actor,
    ) -> Result<(), WorkspaceError> {
        self.commit(|engine| engine.remove_trace_link(link, actor))
    }

    /// Runs a command against the engine and persists everything the
    /// command touched, derived from the audit events it appended.
    fn commit<T>(
        &mut self,
        command: impl FnOnce(&mut Engine) -> Result<T, CommandError>,
    ) -> Result<T, WorkspaceError> {
        let mark = self.state.engine.audit().len();
        let output = command(&mut self.state.engine)?;
        self.persist_from(mark)?;
        Ok(output)
    }

    #[instrument(skip(self))]
    fn persist_from(&self, mark: usize) -> Result<(), WorkspaceError> {
        let events = self.state.engine.audit().events_after(mark);

        let mut dirty: BTreeSet<RecordId> = BTreeSet::new();
        let mut links_dirty = false;
        for event in events {
            dirty.insert(event.aggregate_id);
            match &event.payload {
                AuditPayload::RunApproved { results, .. } => {
                    dirty.extend(results.iter().copied());
                    links_dirty = true;
                }
                AuditPayload::TraceCreated { .. } | AuditPayload::TraceRemoved { .. } => {
                    links_dirty = true;
                }
                _ => {}
            }
        }

        for id in dirty {
            self.persist_aggregate(id)?;
        }
        if links_dirty {
            let links: Vec<&TraceLink> = self.state.engine.registry().iter_links().collect();
            journal::save_links(&self.root.join(LINKS_FILE), &links)?;
        }
        journal::append_events(&self.root.join(JOURNAL_FILE), events)?;
        Ok(())
    }

    fn persist_aggregate(&self, id: RecordId) -> Result<(), WorkspaceError> {
        let engine = &self.state.engine;
        match id.kind() {
            RecordType::TestRun => {
                let run = engine.test_run(id).expect("journalled run exists");
                MarkdownRun::from(run).save_to_path(&self.run_path(id))?;
            }
            RecordType::TestResult => {
                let result = engine.test_result(id).expect("journalled result exists");
                run_file::save_result(result, &self.result_path(id))?;
            }
            _ => {
                let record = engine.record(id).expect("journalled record exists");
                MarkdownRecord::from(record).save_to_path(&self.record_path(id))?;
            }
        }
        Ok(())
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        let digits = self.state.config.digits();
        self.root
            .join(RECORDS_DIR)
            .join(format!("{}.md", id.display(digits)))
    }

    fn run_path(&self, id: RecordId) -> PathBuf {
        let digits = self.state.config.digits();
        self.root
            .join(RUNS_DIR)
            .join(format!("{}.md", id.display(digits)))
    }

    fn result_path(&self, id: RecordId) -> PathBuf {
        let digits = self.state.config.digits();
        self.root
            .join(RESULTS_DIR)
            .join(format!("{}.yaml", id.display(digits)))
    }
}

fn load_config(root: &Path) -> Config {
    let path = root.join(CONFIG_FILE);
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

fn collect_paths(dir: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension() == Some(OsStr::new(extension)))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn try_load_record(path: &Path) -> Result<Record, PathBuf> {
    match MarkdownRecord::load_from_path(path) {
        Ok(md) => {
            let record = Record::from(md);
            if record.id().kind().is_user_creatable() {
                Ok(record)
            } else {
                tracing::debug!("File at {} has a non-record id", path.display());
                Err(path.to_path_buf())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to load record from {}: {:?}", path.display(), e);
            Err(path.to_path_buf())
        }
    }
}

fn try_load_run(path: &Path) -> Result<TestRun, PathBuf> {
    match MarkdownRun::load_from_path(path) {
        Ok(md) => {
            let run = TestRun::from(md);
            if run.id().kind() == RecordType::TestRun {
                Ok(run)
            } else {
                tracing::debug!("File at {} has a non-run id", path.display());
                Err(path.to_path_buf())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to load run from {}: {:?}", path.display(), e);
            Err(path.to_path_buf())
        }
    }
}

fn try_load_result(path: &Path) -> Result<TestResult, PathBuf> {
    match run_file::load_result(path) {
        Ok(result) if result.id().kind() == RecordType::TestResult => Ok(result),
        Ok(_) => {
            tracing::debug!("File at {} has a non-result id", path.display());
            Err(path.to_path_buf())
        }
        Err(e) => {
            tracing::debug!("Failed to load result from {}: {:?}", path.display(), e);
            Err(path.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use nonempty::nonempty;

    use super::*;

    fn actor() -> Actor {
        Actor::new("alice", "alice@example.com", "Alice")
    }

    fn steps() -> Vec<TestStep> {
        vec![TestStep {
            action: "Open the page".to_string(),
            expected: "It loads".to_string(),
        }]
    }

    #[test]
    fn init_creates_the_layout() {
        let tmp = tempfile::tempdir().unwrap();
        Workspace::init(tmp.path().to_path_buf()).unwrap();

        assert!(tmp.path().join("config.toml").is_file());
        assert!(tmp.path().join("records").is_dir());
        assert!(tmp.path().join("runs").is_dir());
        assert!(tmp.path().join("results").is_dir());
    }

    #[test]
    fn created_records_survive_a_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = Workspace::init(tmp.path().to_path_buf()).unwrap();

        let created = ws
            .create_record(
                RecordType::UserRequirement,
                "Login",
                "Users can log in",
                Vec::new(),
                &actor(),
            )
            .unwrap();
        ws.approve_record(created.id(), &actor(), Credential::Verified, None)
            .unwrap();

        let reloaded = Workspace::new(tmp.path().to_path_buf()).load_all().unwrap();
        let record = reloaded.engine().record(created.id()).unwrap();
        assert_eq!(record.title(), "Login");
        assert_eq!(record.revision(), 1);
        assert_eq!(record.version(), 1);
        assert!(record.is_content_consistent());
        assert_eq!(reloaded.engine().audit().len(), 2);
    }

    #[test]
    fn run_approval_persists_results_and_links() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = Workspace::init(tmp.path().to_path_buf()).unwrap();

        let case = ws
            .create_record(RecordType::TestCase, "Verify login", "", steps(), &actor())
            .unwrap();
        let run = ws
            .create_test_run("Smoke", "", &nonempty![case.id()], &actor())
            .unwrap();
        ws.execute_test_case(run.id(), case.id(), &actor(), None)
            .unwrap();
        ws.record_step_result(
            run.id(),
            case.id(),
            1,
            StepStatus::Pass,
            "observed",
            None,
            &actor(),
            None,
        )
        .unwrap();
        ws.approve_test_run(run.id(), &actor(), Credential::Verified, None)
            .unwrap();

        assert!(tmp.path().join("runs/TR-001.md").is_file());
        assert!(tmp.path().join("results/TRES-001.yaml").is_file());

        let reloaded = Workspace::new(tmp.path().to_path_buf()).load_all().unwrap();
        let engine = reloaded.engine();
        assert!(engine.test_run(run.id()).unwrap().is_frozen());
        assert_eq!(engine.iter_results().count(), 1);
        let downstream = engine.downstream_of(case.id()).unwrap();
        assert_eq!(downstream.len(), 1);
        assert!(downstream[0].is_system_generated());
    }

    #[test]
    fn unrecognised_files_fail_the_load_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = Workspace::init(tmp.path().to_path_buf()).unwrap();
        ws.create_record(RecordType::UserRequirement, "Login", "", Vec::new(), &actor())
            .unwrap();
        fs::write(tmp.path().join("records/notes.md"), "scratch pad").unwrap();

        let err = Workspace::new(tmp.path().to_path_buf()).load_all().unwrap_err();
        assert!(matches!(err, WorkspaceLoadError::UnrecognisedFiles(paths) if paths.len() == 1));
    }

    #[test]
    fn unrecognised_files_are_skipped_when_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = Workspace::init(tmp.path().to_path_buf()).unwrap();
        ws.create_record(RecordType::UserRequirement, "Login", "", Vec::new(), &actor())
            .unwrap();
        fs::write(tmp.path().join("records/notes.md"), "scratch pad").unwrap();

        let mut config = Config::default();
        config.allow_unrecognised = true;
        config.save(&tmp.path().join("config.toml")).unwrap();

        let reloaded = Workspace::new(tmp.path().to_path_buf()).load_all().unwrap();
        assert_eq!(reloaded.engine().iter_records().count(), 1);
    }
}
