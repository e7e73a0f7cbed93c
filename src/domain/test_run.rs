//! Test runs, their per-case execution state, and materialized results.
//!
//! Run and case status/result are never stored as ground truth while the
//! run is a draft; they are derived from step results by the pure
//! functions in this module, and only frozen when the run is approved.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use uuid::Uuid;

use crate::domain::{
    record::{Lifecycle, TestStep},
    Actor, Record, RecordId,
};

/// Execution outcome recorded for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Stored as an intermediate save; does not count toward completion.
    NotExecuted,
    /// The step passed.
    Pass,
    /// The step failed.
    Fail,
}

/// Derived execution state of one case within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Execution has not been started.
    NotStarted,
    /// Execution started; not all steps have a counted result.
    InProgress,
    /// Every step has a counted Pass/Fail result.
    Complete,
}

/// Derived verdict of one case within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseResult {
    /// Not all steps have been executed yet.
    Pending,
    /// Every step passed.
    Pass,
    /// At least one step failed.
    Fail,
}

/// Derived state of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No case has been started.
    NotStarted,
    /// At least one case started; not all complete.
    InProgress,
    /// Every case is complete.
    Complete,
    /// The run was approved; status and result are frozen.
    Approved,
}

/// Derived overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    /// No case has failed.
    Pass,
    /// At least one case failed.
    Fail,
}

/// A recorded outcome for one `(case, step)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Execution status of the step.
    pub status: StepStatus,
    /// What the tester actually observed.
    pub actual_result: String,
    /// Opaque key into the external evidence blob store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_file: Option<String>,
    /// When the result was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl StepResult {
    /// Whether this result advances case completion: the step must have an
    /// executed verdict and a non-empty actual-result note.
    #[must_use]
    pub fn counts_toward_completion(&self) -> bool {
        matches!(self.status, StepStatus::Pass | StepStatus::Fail)
            && !self.actual_result.trim().is_empty()
    }
}

/// The association between a run and one of its test cases.
///
/// Owned exclusively by the run that created it. The case's steps are
/// snapshotted at run creation, so later edits to the test case never
/// retroactively alter a run already created against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunCase {
    pub(crate) test_case_uuid: Uuid,
    pub(crate) test_case_id: RecordId,
    /// Steps as they were when the run was created.
    pub(crate) steps: Vec<TestStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) executed_by: Option<Actor>,
    /// Step results keyed by 1-based step number.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) step_results: BTreeMap<usize, StepResult>,
}

impl TestRunCase {
    /// Snapshot a test case into a fresh, unexecuted run case.
    #[must_use]
    pub(crate) fn snapshot(case: &Record) -> Self {
        Self {
            test_case_uuid: case.uuid(),
            test_case_id: case.id(),
            steps: case.steps().to_vec(),
            started_at: None,
            executed_by: None,
            step_results: BTreeMap::new(),
        }
    }

    /// The UUID of the snapshotted test case.
    #[must_use]
    pub const fn test_case_uuid(&self) -> Uuid {
        self.test_case_uuid
    }

    /// The id of the snapshotted test case.
    #[must_use]
    pub const fn test_case_id(&self) -> RecordId {
        self.test_case_id
    }

    /// The snapshotted steps.
    #[must_use]
    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    /// When execution was (last) started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Who is executing the case.
    #[must_use]
    pub const fn executed_by(&self) -> Option<&Actor> {
        self.executed_by.as_ref()
    }

    /// Step results recorded so far, keyed by 1-based step number.
    #[must_use]
    pub const fn step_results(&self) -> &BTreeMap<usize, StepResult> {
        &self.step_results
    }

    /// Begin (or restart) execution: clears any prior step results and
    /// stamps the start. Idempotent by design; restarting an in-progress
    /// case is a fresh attempt, not an error.
    pub(crate) fn start_execution(&mut self, by: Actor, at: DateTime<Utc>) {
        self.step_results.clear();
        self.started_at = Some(at);
        self.executed_by = Some(by);
    }

    /// Derived status of this case.
    #[must_use]
    pub fn status(&self) -> CaseStatus {
        if self.started_at.is_none() && self.step_results.is_empty() {
            return CaseStatus::NotStarted;
        }
        if self.all_steps_counted() {
            CaseStatus::Complete
        } else {
            CaseStatus::InProgress
        }
    }

    /// Derived verdict of this case.
    #[must_use]
    pub fn result(&self) -> CaseResult {
        if self
            .step_results
            .values()
            .any(|r| r.status == StepStatus::Fail)
        {
            return CaseResult::Fail;
        }
        if self.all_steps_counted() {
            CaseResult::Pass
        } else {
            CaseResult::Pending
        }
    }

    fn all_steps_counted(&self) -> bool {
        !self.steps.is_empty()
            && (1..=self.steps.len()).all(|n| {
                self.step_results
                    .get(&n)
                    .is_some_and(StepResult::counts_toward_completion)
            })
    }
}

/// Derives a run's status and overall result from its cases.
///
/// This is the single place run state is computed; every mutation and
/// query goes through it so the logic cannot diverge.
#[must_use]
pub fn derive_run_state(cases: &[TestRunCase]) -> (RunStatus, RunResult) {
    let result = if cases.iter().any(|c| c.result() == CaseResult::Fail) {
        RunResult::Fail
    } else {
        RunResult::Pass
    };

    let status = if cases.iter().all(|c| c.status() == CaseStatus::NotStarted) {
        RunStatus::NotStarted
    } else if cases.iter().all(|c| c.status() == CaseStatus::Complete) {
        RunStatus::Complete
    } else {
        RunStatus::InProgress
    };

    (status, result)
}

/// A test run: an approvable record whose content is a frozen set of test
/// case snapshots and their execution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub(crate) uuid: Uuid,
    pub(crate) id: RecordId,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) cases: Vec<TestRunCase>,
    /// Status and result frozen at approval. `None` while the run is a
    /// draft; derived on demand in that case.
    pub(crate) frozen: Option<(RunStatus, RunResult)>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: Actor,
    pub(crate) modified_at: DateTime<Utc>,
    pub(crate) modified_by: Actor,
    pub(crate) version: u64,
}

impl TestRun {
    #[must_use]
    pub(crate) fn new(
        id: RecordId,
        title: String,
        description: String,
        cases: Vec<TestRunCase>,
        created_by: Actor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            title,
            description,
            lifecycle: Lifecycle::new(),
            cases,
            frozen: None,
            created_at,
            created_by: created_by.clone(),
            modified_at: created_at,
            modified_by: created_by,
            version: 0,
        }
    }

    /// The stable, globally unique identifier.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The human-readable `TR-n` identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// The run title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The run description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The lifecycle state machine for this run.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The run's cases, in the order chosen at creation.
    #[must_use]
    pub fn cases(&self) -> &[TestRunCase] {
        &self.cases
    }

    /// Find a case by its test case id.
    #[must_use]
    pub fn case(&self, test_case_id: RecordId) -> Option<&TestRunCase> {
        self.cases.iter().find(|c| c.test_case_id == test_case_id)
    }

    pub(crate) fn case_mut(&mut self, test_case_id: RecordId) -> Option<&mut TestRunCase> {
        self.cases
            .iter_mut()
            .find(|c| c.test_case_id == test_case_id)
    }

    /// Run status: frozen once approved, derived from cases otherwise.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.frozen
            .map_or_else(|| derive_run_state(&self.cases).0, |(status, _)| status)
    }

    /// Overall result: frozen once approved, derived from cases otherwise.
    #[must_use]
    pub fn overall_result(&self) -> RunResult {
        self.frozen
            .map_or_else(|| derive_run_state(&self.cases).1, |(_, result)| result)
    }

    /// Whether the run is deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// Whether status/result are frozen by approval.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Who created the run.
    #[must_use]
    pub const fn created_by(&self) -> &Actor {
        &self.created_by
    }

    /// Last modification timestamp.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Who last modified the run.
    #[must_use]
    pub const fn modified_by(&self) -> &Actor {
        &self.modified_by
    }

    /// The optimistic-concurrency token.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Hash of the run's content: title, description, and the per-case
    /// verdicts. Captured into the approval stamp when the run is
    /// approved.
    ///
    /// # Panics
    ///
    /// Panics if borsh serialization fails, which cannot happen for this
    /// data.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(borsh::BorshSerialize)]
        struct FingerprintData<'a> {
            title: &'a str,
            description: &'a str,
            verdicts: Vec<(String, u8)>,
        }

        let verdicts = self
            .cases
            .iter()
            .map(|case| {
                let verdict = match case.result() {
                    CaseResult::Pending => 0_u8,
                    CaseResult::Pass => 1,
                    CaseResult::Fail => 2,
                };
                (case.test_case_id.to_string(), verdict)
            })
            .collect();

        let data = FingerprintData {
            title: &self.title,
            description: &self.description,
            verdicts,
        };

        let encoded = borsh::to_vec(&data).expect("this should never fail");
        let hash = sha2::Sha256::digest(encoded);
        format!("{hash:x}")
    }
}

/// A synthetic result node materialized when a run is approved.
///
/// Created exactly once per `(run, case)` pair at the moment of approval
/// and never mutated afterward. The downstream end of system-generated
/// trace links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub(crate) uuid: Uuid,
    pub(crate) id: RecordId,
    pub(crate) run_uuid: Uuid,
    pub(crate) run_id: RecordId,
    pub(crate) test_case_uuid: Uuid,
    pub(crate) test_case_id: RecordId,
    /// The case's final verdict at approval time.
    pub(crate) result: CaseResult,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) deleted_at: Option<DateTime<Utc>>,
}

impl TestResult {
    /// The stable, globally unique identifier.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The human-readable `TRES-n` identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// The id of the run that produced this result.
    #[must_use]
    pub const fn run_id(&self) -> RecordId {
        self.run_id
    }

    /// The id of the test case this result verifies.
    #[must_use]
    pub const fn test_case_id(&self) -> RecordId {
        self.test_case_id
    }

    /// The final verdict.
    #[must_use]
    pub const fn result(&self) -> CaseResult {
        self.result
    }

    /// When the result was materialized.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Soft-deletion timestamp, if deleted.
    #[must_use]
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the result has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
