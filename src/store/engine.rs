//! The command/query engine over the registry.
//!
//! Every command validates all of its guards before mutating anything and
//! appends its audit events in the same call, so a failed command leaves
//! no partial state and no orphan event. Guard order is fixed: not-found,
//! version conflict, deletion, credential, transition legality, type
//! preconditions, field validation.

use std::collections::HashSet;

use chrono::Utc;
use non_empty_string::NonEmptyString;
use nonempty::NonEmpty;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    domain::{
        record::ApprovalStatus,
        test_run::{derive_run_state, CaseResult, RunStatus},
        trace::{edge_allowed, edge_user_creatable},
        Actor, AuditEvent, AuditFilter, AuditLog, AuditPayload, Credential, LinkId, Record,
        RecordId, RecordType, StepResult, StepStatus, TestResult, TestRun, TestRunCase, TestStep,
        TraceEnd, TraceError, TraceLink, TransitionError,
    },
    store::{CommandError, Registry},
};

/// A partial update to a record's content. Unset fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement step list. Only valid for test cases.
    pub steps: Option<Vec<TestStep>>,
}

/// The lifecycle, execution, traceability, and audit engine.
///
/// Owns the [`Registry`] and the [`AuditLog`] so that a state mutation
/// and its audit events commit as one unit. Callers hold the engine
/// behind whatever synchronization serializes their commands; the engine
/// itself detects stale reads through the per-record version token.
#[derive(Debug, Default)]
pub struct Engine {
    registry: Registry,
    audit: AuditLog,
}

impl Engine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles an engine from previously persisted state.
    #[must_use]
    pub const fn from_parts(registry: Registry, audit: AuditLog) -> Self {
        Self { registry, audit }
    }

    /// The underlying registry, read-only.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The audit ledger, read-only.
    #[must_use]
    pub const fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Creates a draft record of a user-creatable kind.
    ///
    /// # Errors
    ///
    /// Fails with `Validation` if the kind cannot be created directly,
    /// the title is empty, or the steps are malformed for the kind.
    #[instrument(skip(self))]
    pub fn create_record(
        &mut self,
        kind: RecordType,
        title: &str,
        description: &str,
        steps: Vec<TestStep>,
        actor: &Actor,
    ) -> Result<&Record, CommandError> {
        if !kind.is_user_creatable() {
            return Err(CommandError::Validation(format!(
                "{kind} records cannot be created directly"
            )));
        }
        let title = validated_title(title)?;
        validated_steps(kind, &steps)?;

        let now = Utc::now();
        let id = RecordId::new(kind, self.registry.next_index(kind));
        let record = Record::new(
            id,
            title.clone(),
            description.to_string(),
            steps,
            actor.clone(),
            now,
        );
        self.registry.insert_record(record);
        self.audit
            .append(now, actor.clone(), kind, id, AuditPayload::Created { title });

        Ok(self.registry.record_by_id(id).expect("just inserted"))
    }

    /// Edits a record's content.
    ///
    /// Editing an approved record requires a verified credential and
    /// flips it back to draft in the same commit, leaving the revision
    /// unchanged. A no-op edit (no field actually changes value) emits no
    /// event and does not bump the version.
    ///
    /// # Errors
    ///
    /// Fails on unknown id, stale version, deleted or frozen state,
    /// missing credential, or invalid fields.
    #[instrument(skip(self))]
    pub fn edit_record(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        match id.kind() {
            RecordType::TestRun => self.edit_run(id, patch, actor, expected_version),
            RecordType::TestResult => {
                self.registry
                    .result_by_id(id)
                    .ok_or(CommandError::NotFound(id))?;
                Err(CommandError::InvalidTransition {
                    id,
                    source: TransitionError::Frozen,
                })
            }
            _ => self.edit_plain_record(id, patch, actor, credential, expected_version),
        }
    }

    fn edit_plain_record(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        let record = self
            .registry
            .record_by_id(id)
            .ok_or(CommandError::NotFound(id))?;
        check_version(id, record.version(), expected_version)?;
        if record.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        let was_approved = record.lifecycle().is_approved();
        if was_approved {
            verify_required(credential, id)?;
        }
        if let Some(title) = &patch.title {
            validated_title(title)?;
        }
        if let Some(steps) = &patch.steps {
            validated_steps(record.kind(), steps)?;
        }

        let changed = patch
            .title
            .as_ref()
            .is_some_and(|t| t.trim() != record.title())
            || patch
                .description
                .as_ref()
                .is_some_and(|d| d != record.description())
            || patch
                .steps
                .as_ref()
                .is_some_and(|s| s.as_slice() != record.steps());
        if !changed {
            return Ok(());
        }

        let kind = record.kind();
        let old_fingerprint = record.fingerprint();
        let now = Utc::now();

        let record = self
            .registry
            .record_by_id_mut(id)
            .expect("resolved above");
        if was_approved {
            record
                .lifecycle
                .revert_to_draft()
                .expect("approved and not deleted");
        }
        if let Some(title) = patch.title {
            record.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(steps) = patch.steps {
            record.steps = steps;
        }
        record.modified_at = now;
        record.modified_by = actor.clone();
        record.version += 1;
        let new_fingerprint = record.fingerprint();
        let revision = record.revision();

        if was_approved {
            self.audit.append(
                now,
                actor.clone(),
                kind,
                id,
                AuditPayload::RevertedToDraft { revision },
            );
        }
        self.audit.append(
            now,
            actor.clone(),
            kind,
            id,
            AuditPayload::Updated {
                old_fingerprint,
                new_fingerprint,
            },
        );
        Ok(())
    }

    fn edit_run(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        let run = self.registry.run_by_id(id).ok_or(CommandError::NotFound(id))?;
        check_version(id, run.version(), expected_version)?;
        if run.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        // Approval locks a run for good; unfreezing would contradict the
        // immutability of its materialized results.
        if run.lifecycle().is_approved() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Frozen,
            });
        }
        if patch.steps.is_some() {
            return Err(CommandError::Validation(
                "test runs do not carry steps".to_string(),
            ));
        }
        if let Some(title) = &patch.title {
            validated_title(title)?;
        }

        let changed = patch
            .title
            .as_ref()
            .is_some_and(|t| t.trim() != run.title())
            || patch
                .description
                .as_ref()
                .is_some_and(|d| d != run.description());
        if !changed {
            return Ok(());
        }

        let old_fingerprint = run.fingerprint();
        let now = Utc::now();

        let run = self.registry.run_by_id_mut(id).expect("resolved above");
        if let Some(title) = patch.title {
            run.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            run.description = description;
        }
        run.modified_at = now;
        run.modified_by = actor.clone();
        run.version += 1;
        let new_fingerprint = run.fingerprint();

        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            id,
            AuditPayload::Updated {
                old_fingerprint,
                new_fingerprint,
            },
        );
        Ok(())
    }

    /// Approves a draft record, incrementing its revision.
    ///
    /// For test runs this delegates to [`Self::approve_test_run`].
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// Fails on unknown id, stale version, deleted state, unverified
    /// credential, or a record that is not currently a draft.
    #[instrument(skip(self))]
    pub fn approve_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Credential,
        expected_version: Option<u64>,
    ) -> Result<u32, CommandError> {
        match id.kind() {
            RecordType::TestRun => self
                .approve_test_run(id, actor, credential, expected_version)
                .map(|run| run.lifecycle().revision()),
            RecordType::TestResult => {
                self.registry
                    .result_by_id(id)
                    .ok_or(CommandError::NotFound(id))?;
                Err(CommandError::InvalidTransition {
                    id,
                    source: TransitionError::Frozen,
                })
            }
            _ => self.approve_plain_record(id, actor, credential, expected_version),
        }
    }

    fn approve_plain_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Credential,
        expected_version: Option<u64>,
    ) -> Result<u32, CommandError> {
        let record = self
            .registry
            .record_by_id(id)
            .ok_or(CommandError::NotFound(id))?;
        check_version(id, record.version(), expected_version)?;
        if record.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        verify(credential, id)?;

        let kind = record.kind();
        let fingerprint = record.fingerprint();
        let now = Utc::now();

        let record = self
            .registry
            .record_by_id_mut(id)
            .expect("resolved above");
        record
            .lifecycle
            .approve(actor.clone(), now, fingerprint)
            .map_err(|source| CommandError::InvalidTransition { id, source })?;
        record.modified_at = now;
        record.modified_by = actor.clone();
        record.version += 1;
        let revision = record.revision();

        self.audit.append(
            now,
            actor.clone(),
            kind,
            id,
            AuditPayload::Approved { revision },
        );
        Ok(revision)
    }

    /// Soft-deletes a record, run, or result.
    ///
    /// Deleting an approved record or run requires a verified credential.
    /// Deleting a run leaves its materialized results in place; deleting
    /// a test result also hard-deletes its incoming system-generated
    /// trace links, which is the only path that removes such a link.
    /// Test results carry no version token, so `expected_version` is
    /// ignored for them.
    ///
    /// # Errors
    ///
    /// Fails on unknown id, stale version, an already deleted record, or
    /// a missing credential.
    #[instrument(skip(self))]
    pub fn delete_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        match id.kind() {
            RecordType::TestRun => self.delete_run(id, actor, credential, expected_version),
            RecordType::TestResult => self.delete_result(id, actor),
            _ => self.delete_plain_record(id, actor, credential, expected_version),
        }
    }

    fn delete_plain_record(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        let record = self
            .registry
            .record_by_id(id)
            .ok_or(CommandError::NotFound(id))?;
        check_version(id, record.version(), expected_version)?;
        if record.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        if record.lifecycle().is_approved() {
            verify_required(credential, id)?;
        }

        let kind = record.kind();
        let now = Utc::now();
        let record = self
            .registry
            .record_by_id_mut(id)
            .expect("resolved above");
        record.lifecycle.mark_deleted(now).expect("checked above");
        record.modified_at = now;
        record.modified_by = actor.clone();
        record.version += 1;

        self.audit
            .append(now, actor.clone(), kind, id, AuditPayload::Deleted);
        Ok(())
    }

    fn delete_run(
        &mut self,
        id: RecordId,
        actor: &Actor,
        credential: Option<Credential>,
        expected_version: Option<u64>,
    ) -> Result<(), CommandError> {
        let run = self.registry.run_by_id(id).ok_or(CommandError::NotFound(id))?;
        check_version(id, run.version(), expected_version)?;
        if run.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        if run.lifecycle().is_approved() {
            verify_required(credential, id)?;
        }

        let now = Utc::now();
        let run = self.registry.run_by_id_mut(id).expect("resolved above");
        run.lifecycle.mark_deleted(now).expect("checked above");
        run.modified_at = now;
        run.modified_by = actor.clone();
        run.version += 1;

        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            id,
            AuditPayload::Deleted,
        );
        Ok(())
    }

    fn delete_result(&mut self, id: RecordId, actor: &Actor) -> Result<(), CommandError> {
        let result = self
            .registry
            .result_by_id(id)
            .ok_or(CommandError::NotFound(id))?;
        if result.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id,
                source: TransitionError::Deleted,
            });
        }
        let uuid = result.uuid();
        let now = Utc::now();

        let result = self
            .registry
            .result_by_id_mut(id)
            .expect("resolved above");
        result.deleted_at = Some(now);
        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestResult,
            id,
            AuditPayload::Deleted,
        );

        // System links into a result are removed with it.
        let incoming: Vec<LinkId> = self.registry.links_to(uuid).map(TraceLink::id).collect();
        for link_id in incoming {
            let link = self.registry.remove_link(link_id).expect("listed above");
            self.audit.append(
                now,
                actor.clone(),
                link.from().id.kind(),
                link.from().id,
                AuditPayload::TraceRemoved {
                    link: link.id(),
                    from: link.from().id,
                    to: link.to().id,
                },
            );
        }
        Ok(())
    }

    /// Creates a draft test run over a non-empty set of test cases,
    /// snapshotting each case's steps. Later edits to a case never alter
    /// a run already created against it.
    ///
    /// # Errors
    ///
    /// Fails if the title is empty, a referenced id is not a live test
    /// case, a case is referenced twice, or a case has no steps (such a
    /// run could never complete).
    #[instrument(skip(self))]
    pub fn create_test_run(
        &mut self,
        title: &str,
        description: &str,
        test_cases: &NonEmpty<RecordId>,
        actor: &Actor,
    ) -> Result<&TestRun, CommandError> {
        let title = validated_title(title)?;

        let mut seen = HashSet::new();
        let mut snapshots = Vec::with_capacity(test_cases.len());
        for case_id in test_cases {
            if case_id.kind() != RecordType::TestCase {
                return Err(CommandError::Validation(format!(
                    "{case_id} is not a test case"
                )));
            }
            if !seen.insert(*case_id) {
                return Err(CommandError::Validation(format!(
                    "{case_id} is referenced more than once"
                )));
            }
            let uuid = self.live_uuid(*case_id)?;
            let case = self.registry.record(uuid).expect("resolved above");
            if case.steps().is_empty() {
                return Err(CommandError::PreconditionFailed {
                    id: *case_id,
                    message: "test case has no steps".to_string(),
                });
            }
            snapshots.push(TestRunCase::snapshot(case));
        }

        let now = Utc::now();
        let id = RecordId::new(
            RecordType::TestRun,
            self.registry.next_index(RecordType::TestRun),
        );
        let run = TestRun::new(
            id,
            title.clone(),
            description.to_string(),
            snapshots,
            actor.clone(),
            now,
        );
        self.registry.insert_run(run);
        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            id,
            AuditPayload::Created { title },
        );

        Ok(self.registry.run_by_id(id).expect("just inserted"))
    }

    /// Begins (or restarts) execution of a case within a run, clearing
    /// any prior step results. Idempotent: restarting an in-progress case
    /// is a fresh attempt, not an error.
    ///
    /// # Errors
    ///
    /// Fails on unknown run or case, stale version, or a deleted or
    /// approved run.
    #[instrument(skip(self))]
    pub fn execute_test_case(
        &mut self,
        run_id: RecordId,
        test_case_id: RecordId,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<&TestRunCase, CommandError> {
        let run = self.unlocked_run(run_id, expected_version)?;
        run.case(test_case_id)
            .ok_or(CommandError::NotFound(test_case_id))?;

        let now = Utc::now();
        let run = self.registry.run_by_id_mut(run_id).expect("resolved above");
        run.case_mut(test_case_id)
            .expect("resolved above")
            .start_execution(actor.clone(), now);
        run.modified_at = now;
        run.modified_by = actor.clone();
        run.version += 1;

        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            run_id,
            AuditPayload::ExecutionStarted {
                test_case: test_case_id,
            },
        );

        Ok(self
            .registry
            .run_by_id(run_id)
            .and_then(|run| run.case(test_case_id))
            .expect("resolved above"))
    }

    /// Records (upserts) the result of one step of a case within a run.
    ///
    /// A `NotExecuted` status or an empty actual result is storable as an
    /// intermediate save but does not advance the case toward completion.
    ///
    /// # Errors
    ///
    /// Fails on unknown run or case, stale version, a deleted or approved
    /// run, a case whose execution has not been started, or a step number
    /// out of range.
    #[instrument(skip(self))]
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
    ) -> Result<&TestRunCase, CommandError> {
        let run = self.unlocked_run(run_id, expected_version)?;
        let case = run
            .case(test_case_id)
            .ok_or(CommandError::NotFound(test_case_id))?;
        if case.started_at().is_none() {
            return Err(CommandError::PreconditionFailed {
                id: test_case_id,
                message: "execution has not been started".to_string(),
            });
        }
        if step == 0 || step > case.steps().len() {
            return Err(CommandError::Validation(format!(
                "step {step} is out of range for {test_case_id} (1..={})",
                case.steps().len()
            )));
        }

        let now = Utc::now();
        let run = self.registry.run_by_id_mut(run_id).expect("resolved above");
        run.case_mut(test_case_id)
            .expect("resolved above")
            .step_results
            .insert(
                step,
                StepResult {
                    status,
                    actual_result: actual_result.to_string(),
                    evidence_file,
                    recorded_at: now,
                },
            );
        run.modified_at = now;
        run.modified_by = actor.clone();
        run.version += 1;

        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            run_id,
            AuditPayload::StepRecorded {
                test_case: test_case_id,
                step,
                status,
            },
        );

        Ok(self
            .registry
            .run_by_id(run_id)
            .and_then(|run| run.case(test_case_id))
            .expect("resolved above"))
    }

    /// Approves a complete test run.
    ///
    /// Atomically: freezes the run's status and overall result,
    /// increments its revision, materializes one test result per case,
    /// creates one system-generated trace link per result, and appends
    /// the `Completed`, `RunApproved`, and per-link `TraceCreated`
    /// events, in that order.
    ///
    /// # Errors
    ///
    /// Fails on unknown run, stale version, deleted run, unverified
    /// credential, a run that is already approved, or a run that is not
    /// complete. On failure nothing is materialized.
    #[instrument(skip(self))]
    pub fn approve_test_run(
        &mut self,
        run_id: RecordId,
        actor: &Actor,
        credential: Credential,
        expected_version: Option<u64>,
    ) -> Result<&TestRun, CommandError> {
        let run = self
            .registry
            .run_by_id(run_id)
            .ok_or(CommandError::NotFound(run_id))?;
        check_version(run_id, run.version(), expected_version)?;
        if run.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id: run_id,
                source: TransitionError::Deleted,
            });
        }
        verify(credential, run_id)?;
        if run.lifecycle().is_approved() {
            return Err(CommandError::InvalidTransition {
                id: run_id,
                source: TransitionError::AlreadyInState(ApprovalStatus::Approved),
            });
        }
        let (status, result) = derive_run_state(run.cases());
        if status != RunStatus::Complete {
            return Err(CommandError::PreconditionFailed {
                id: run_id,
                message: format!("test run is {status:?}, not complete"),
            });
        }

        // All guards passed; everything below is infallible, so the
        // composite (freeze + results + links + events) commits as one.
        let verdicts: Vec<(Uuid, RecordId, CaseResult)> = run
            .cases()
            .iter()
            .map(|case| (case.test_case_uuid(), case.test_case_id(), case.result()))
            .collect();
        let run_uuid = run.uuid();
        let now = Utc::now();

        let run = self.registry.run_by_id_mut(run_id).expect("resolved above");
        let fingerprint = run.fingerprint();
        run.lifecycle
            .approve(actor.clone(), now, fingerprint)
            .expect("draft and not deleted");
        run.frozen = Some((RunStatus::Approved, result));
        run.modified_at = now;
        run.modified_by = actor.clone();
        run.version += 1;
        let revision = run.lifecycle().revision();

        let mut result_ids = Vec::with_capacity(verdicts.len());
        let mut created_links = Vec::with_capacity(verdicts.len());
        for (case_uuid, case_id, verdict) in verdicts {
            let result_id = RecordId::new(
                RecordType::TestResult,
                self.registry.next_index(RecordType::TestResult),
            );
            let materialized = TestResult {
                uuid: Uuid::new_v4(),
                id: result_id,
                run_uuid,
                run_id,
                test_case_uuid: case_uuid,
                test_case_id: case_id,
                result: verdict,
                created_at: now,
                deleted_at: None,
            };
            let result_uuid = materialized.uuid();
            self.registry.insert_result(materialized);

            let link = TraceLink {
                id: LinkId::generate(),
                from: TraceEnd {
                    uuid: case_uuid,
                    id: case_id,
                },
                to: TraceEnd {
                    uuid: result_uuid,
                    id: result_id,
                },
                created_at: now,
                created_by: actor.clone(),
                system_generated: true,
            };
            created_links.push((link.id(), case_id, result_id));
            self.registry.insert_link(link);
            result_ids.push(result_id);
        }

        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            run_id,
            AuditPayload::Completed { result },
        );
        self.audit.append(
            now,
            actor.clone(),
            RecordType::TestRun,
            run_id,
            AuditPayload::RunApproved {
                result,
                revision,
                results: result_ids,
            },
        );
        for (link, from, to) in created_links {
            self.audit.append(
                now,
                actor.clone(),
                RecordType::TestCase,
                from,
                AuditPayload::TraceCreated {
                    link,
                    from,
                    to,
                    system_generated: true,
                },
            );
        }

        Ok(self.registry.run_by_id(run_id).expect("resolved above"))
    }

    /// Creates a trace link between two live records.
    ///
    /// If the identical user-created edge already exists this is an
    /// idempotent no-op returning the existing link, without an event.
    ///
    /// # Errors
    ///
    /// Fails on unknown endpoints, self-loops, type pairs outside the
    /// whitelist, the reserved test case → test result pair, or an
    /// existing system-generated edge between the endpoints.
    #[instrument(skip(self))]
    pub fn add_trace_link(
        &mut self,
        from: RecordId,
        to: RecordId,
        actor: &Actor,
    ) -> Result<&TraceLink, CommandError> {
        let from_uuid = self.live_uuid(from)?;
        let to_uuid = self.live_uuid(to)?;
        if from == to {
            return Err(TraceError::SelfLoop { id: from }.into());
        }
        if !edge_allowed(from.kind(), to.kind()) {
            return Err(TraceError::DisallowedPair {
                from: from.kind(),
                to: to.kind(),
            }
            .into());
        }
        if !edge_user_creatable(from.kind(), to.kind()) {
            return Err(TraceError::SystemPairReserved { to }.into());
        }
        if let Some(existing) = self.registry.edge_between(from_uuid, to_uuid) {
            if existing.is_system_generated() {
                return Err(TraceError::DuplicateOfSystemLink { from, to }.into());
            }
            let id = existing.id();
            return Ok(self.registry.link(id).expect("just found"));
        }

        let now = Utc::now();
        let link = TraceLink {
            id: LinkId::generate(),
            from: TraceEnd {
                uuid: from_uuid,
                id: from,
            },
            to: TraceEnd { uuid: to_uuid, id: to },
            created_at: now,
            created_by: actor.clone(),
            system_generated: false,
        };
        let id = link.id();
        self.registry.insert_link(link);
        self.audit.append(
            now,
            actor.clone(),
            from.kind(),
            from,
            AuditPayload::TraceCreated {
                link: id,
                from,
                to,
                system_generated: false,
            },
        );

        Ok(self.registry.link(id).expect("just inserted"))
    }

    /// Removes a user-created trace link.
    ///
    /// # Errors
    ///
    /// Fails on an unknown link id, or a system-generated link (those
    /// only go away with their originating test result).
    #[instrument(skip(self))]
    pub fn remove_trace_link(&mut self, link: LinkId, actor: &Actor) -> Result<(), CommandError> {
        let existing = self
            .registry
            .link(link)
            .ok_or(CommandError::LinkNotFound(link))?;
        if existing.is_system_generated() {
            return Err(TraceError::SystemLinkImmutable { link }.into());
        }

        let removed = self.registry.remove_link(link).expect("resolved above");
        let now = Utc::now();
        self.audit.append(
            now,
            actor.clone(),
            removed.from().id.kind(),
            removed.from().id,
            AuditPayload::TraceRemoved {
                link,
                from: removed.from().id,
                to: removed.to().id,
            },
        );
        Ok(())
    }

    /// Retrieves a record by id, deleted included.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.registry.record_by_id(id)
    }

    /// Retrieves a test run by id, deleted included.
    #[must_use]
    pub fn test_run(&self, id: RecordId) -> Option<&TestRun> {
        self.registry.run_by_id(id)
    }

    /// Retrieves a test result by id, deleted included.
    #[must_use]
    pub fn test_result(&self, id: RecordId) -> Option<&TestResult> {
        self.registry.result_by_id(id)
    }

    /// All live records, in id order.
    pub fn iter_records(&self) -> impl Iterator<Item = &Record> {
        self.registry.iter_records().filter(|r| !r.is_deleted())
    }

    /// All live test runs, in id order.
    pub fn iter_runs(&self) -> impl Iterator<Item = &TestRun> {
        self.registry.iter_runs().filter(|r| !r.is_deleted())
    }

    /// All live test results, in id order.
    pub fn iter_results(&self) -> impl Iterator<Item = &TestResult> {
        self.registry.iter_results().filter(|r| !r.is_deleted())
    }

    /// Direct upstream links of a record, excluding links whose other
    /// endpoint has been deleted.
    ///
    /// # Errors
    ///
    /// Fails if the id does not name a live record.
    pub fn upstream_of(&self, id: RecordId) -> Result<Vec<&TraceLink>, CommandError> {
        let uuid = self.live_uuid(id)?;
        Ok(self
            .registry
            .links_to(uuid)
            .filter(|link| self.is_live(link.from().id))
            .collect())
    }

    /// Direct downstream links of a record, excluding links whose other
    /// endpoint has been deleted.
    ///
    /// # Errors
    ///
    /// Fails if the id does not name a live record.
    pub fn downstream_of(&self, id: RecordId) -> Result<Vec<&TraceLink>, CommandError> {
        let uuid = self.live_uuid(id)?;
        Ok(self
            .registry
            .links_from(uuid)
            .filter(|link| self.is_live(link.to().id))
            .collect())
    }

    /// The filtered audit trail, ordered by time then insertion order.
    #[must_use]
    pub fn audit_trail(&self, filter: &AuditFilter) -> Vec<&AuditEvent> {
        self.audit.trail(filter)
    }

    fn unlocked_run(
        &self,
        run_id: RecordId,
        expected_version: Option<u64>,
    ) -> Result<&TestRun, CommandError> {
        let run = self
            .registry
            .run_by_id(run_id)
            .ok_or(CommandError::NotFound(run_id))?;
        check_version(run_id, run.version(), expected_version)?;
        if run.is_deleted() {
            return Err(CommandError::InvalidTransition {
                id: run_id,
                source: TransitionError::Deleted,
            });
        }
        if run.is_frozen() {
            return Err(CommandError::InvalidTransition {
                id: run_id,
                source: TransitionError::Frozen,
            });
        }
        Ok(run)
    }

    fn live_uuid(&self, id: RecordId) -> Result<Uuid, CommandError> {
        let uuid = self.registry.uuid_of(id).ok_or(CommandError::NotFound(id))?;
        if self.is_live_uuid(id.kind(), uuid) {
            Ok(uuid)
        } else {
            Err(CommandError::NotFound(id))
        }
    }

    fn is_live(&self, id: RecordId) -> bool {
        self.registry
            .uuid_of(id)
            .is_some_and(|uuid| self.is_live_uuid(id.kind(), uuid))
    }

    fn is_live_uuid(&self, kind: RecordType, uuid: Uuid) -> bool {
        match kind {
            RecordType::TestRun => self.registry.run(uuid).is_some_and(|r| !r.is_deleted()),
            RecordType::TestResult => self.registry.result(uuid).is_some_and(|r| !r.is_deleted()),
            _ => self.registry.record(uuid).is_some_and(|r| !r.is_deleted()),
        }
    }
}

fn validated_title(title: &str) -> Result<String, CommandError> {
    NonEmptyString::new(title.trim().to_string())
        .map(String::from)
        .map_err(|_| CommandError::Validation("title must not be empty".to_string()))
}

fn validated_steps(kind: RecordType, steps: &[TestStep]) -> Result<(), CommandError> {
    if kind != RecordType::TestCase && !steps.is_empty() {
        return Err(CommandError::Validation(format!(
            "{kind} records do not carry steps"
        )));
    }
    for (number, step) in steps.iter().enumerate() {
        if step.action.trim().is_empty() || step.expected.trim().is_empty() {
            return Err(CommandError::Validation(format!(
                "step {} must have an action and an expected result",
                number + 1
            )));
        }
    }
    Ok(())
}

const fn check_version(
    id: RecordId,
    actual: u64,
    expected: Option<u64>,
) -> Result<(), CommandError> {
    match expected {
        Some(expected) if expected != actual => Err(CommandError::Conflict {
            id,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

fn verify(credential: Credential, id: RecordId) -> Result<(), CommandError> {
    if credential.is_verified() {
        Ok(())
    } else {
        Err(CommandError::CredentialRejected(id))
    }
}

fn verify_required(credential: Option<Credential>, id: RecordId) -> Result<(), CommandError> {
    credential.map_or(Err(CommandError::CredentialRejected(id)), |credential| {
        verify(credential, id)
    })
}

#[cfg(test)]
mod tests {
    use nonempty::nonempty;

    use super::*;
    use crate::store::ErrorKind;

    fn actor() -> Actor {
        Actor::new("alice", "alice@example.com", "Alice")
    }

    fn step(action: &str, expected: &str) -> TestStep {
        TestStep {
            action: action.to_string(),
            expected: expected.to_string(),
        }
    }

    fn two_steps() -> Vec<TestStep> {
        vec![step("Open the page", "It loads"), step("Log in", "Dashboard shows")]
    }

    /// A requirement pair and a two-step test case.
    fn seeded() -> Engine {
        let mut engine = Engine::new();
        engine
            .create_record(
                RecordType::UserRequirement,
                "Login",
                "Users can log in",
                Vec::new(),
                &actor(),
            )
            .unwrap();
        engine
            .create_record(
                RecordType::SystemRequirement,
                "Password auth",
                "",
                Vec::new(),
                &actor(),
            )
            .unwrap();
        engine
            .create_record(
                RecordType::TestCase,
                "Verify login",
                "",
                two_steps(),
                &actor(),
            )
            .unwrap();
        engine
    }

    fn id(s: &str) -> RecordId {
        s.parse().unwrap()
    }

    fn complete_case(engine: &mut Engine, run: RecordId, case: RecordId, last: StepStatus) {
        engine
            .execute_test_case(run, case, &actor(), None)
            .unwrap();
        let steps = engine
            .test_run(run)
            .unwrap()
            .case(case)
            .unwrap()
            .steps()
            .len();
        for number in 1..=steps {
            let status = if number == steps { last } else { StepStatus::Pass };
            engine
                .record_step_result(run, case, number, status, "observed", None, &actor(), None)
                .unwrap();
        }
    }

    #[test]
    fn create_allocates_sequential_ids_per_kind() {
        let mut engine = Engine::new();
        for expected in ["UR-1", "UR-2"] {
            let record = engine
                .create_record(
                    RecordType::UserRequirement,
                    "Title",
                    "",
                    Vec::new(),
                    &actor(),
                )
                .unwrap();
            assert_eq!(record.id().to_string(), expected);
        }
        let record = engine
            .create_record(RecordType::TestCase, "Title", "", two_steps(), &actor())
            .unwrap();
        assert_eq!(record.id().to_string(), "TC-1");
    }

    #[test]
    fn create_rejects_non_creatable_kinds_and_empty_titles() {
        let mut engine = Engine::new();
        let err = engine
            .create_record(RecordType::TestResult, "Title", "", Vec::new(), &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = engine
            .create_record(RecordType::UserRequirement, "  ", "", Vec::new(), &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = engine
            .create_record(
                RecordType::UserRequirement,
                "Title",
                "",
                two_steps(),
                &actor(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn noop_edit_emits_nothing() {
        let mut engine = seeded();
        let before_events = engine.audit().len();
        let before_version = engine.record(id("UR-1")).unwrap().version();

        engine
            .edit_record(
                id("UR-1"),
                RecordPatch {
                    title: Some("Login".to_string()),
                    ..RecordPatch::default()
                },
                &actor(),
                None,
                None,
            )
            .unwrap();

        assert_eq!(engine.audit().len(), before_events);
        assert_eq!(engine.record(id("UR-1")).unwrap().version(), before_version);
    }

    #[test]
    fn edit_bumps_version_and_emits_updated() {
        let mut engine = seeded();
        engine
            .edit_record(
                id("UR-1"),
                RecordPatch {
                    description: Some("Users can log in with SSO".to_string()),
                    ..RecordPatch::default()
                },
                &actor(),
                None,
                None,
            )
            .unwrap();

        let record = engine.record(id("UR-1")).unwrap();
        assert_eq!(record.version(), 1);
        assert_eq!(record.revision(), 0);
        let last = engine.audit().iter().last().unwrap();
        assert_eq!(last.name(), "UserRequirementUpdated");
    }

    #[test]
    fn edit_of_approved_record_requires_credential_and_reverts() {
        let mut engine = seeded();
        engine
            .approve_record(id("UR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        let patch = RecordPatch {
            title: Some("Login v2".to_string()),
            ..RecordPatch::default()
        };
        let err = engine
            .edit_record(id("UR-1"), patch.clone(), &actor(), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialRejected);

        engine
            .edit_record(
                id("UR-1"),
                patch,
                &actor(),
                Some(Credential::Verified),
                None,
            )
            .unwrap();
        let record = engine.record(id("UR-1")).unwrap();
        assert_eq!(record.status(), ApprovalStatus::Draft);
        assert_eq!(record.revision(), 1);
        assert!(record.is_content_consistent());

        let names: Vec<String> = engine.audit().iter().map(AuditEvent::name).collect();
        let tail = &names[names.len() - 2..];
        assert_eq!(tail, ["UserRequirementRevertedToDraft", "UserRequirementUpdated"]);
    }

    #[test]
    fn stale_version_conflicts_before_other_guards() {
        let mut engine = seeded();
        let stale = engine.record(id("UR-1")).unwrap().version();
        engine
            .edit_record(
                id("UR-1"),
                RecordPatch {
                    description: Some("changed".to_string()),
                    ..RecordPatch::default()
                },
                &actor(),
                None,
                Some(stale),
            )
            .unwrap();

        // Second writer still holds the stale token.
        let err = engine
            .approve_record(id("UR-1"), &actor(), Credential::Verified, Some(stale))
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Conflict {
                id: id("UR-1"),
                expected: stale,
                actual: stale + 1
            }
        );
    }

    #[test]
    fn delete_of_approved_record_requires_credential() {
        let mut engine = seeded();
        engine
            .approve_record(id("SR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        let err = engine
            .delete_record(id("SR-1"), &actor(), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialRejected);

        engine
            .delete_record(id("SR-1"), &actor(), Some(Credential::Verified), None)
            .unwrap();
        assert!(engine.record(id("SR-1")).unwrap().is_deleted());
        assert!(engine.iter_records().all(|r| r.id() != id("SR-1")));

        // The id stays reserved.
        let next = engine
            .create_record(
                RecordType::SystemRequirement,
                "Replacement",
                "",
                Vec::new(),
                &actor(),
            )
            .unwrap();
        assert_eq!(next.id().to_string(), "SR-2");
    }

    #[test]
    fn run_creation_validates_cases_and_snapshots_steps() {
        let mut engine = seeded();

        let err = engine
            .create_test_run("Smoke", "", &nonempty![id("TC-9")], &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine
            .create_test_run("Smoke", "", &nonempty![id("UR-1")], &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1"), id("TC-1")], &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();

        // Editing the case afterwards does not touch the snapshot.
        engine
            .edit_record(
                id("TC-1"),
                RecordPatch {
                    steps: Some(vec![step("Changed", "Changed")]),
                    ..RecordPatch::default()
                },
                &actor(),
                None,
                None,
            )
            .unwrap();
        let snapshot = engine.test_run(id("TR-1")).unwrap().case(id("TC-1")).unwrap();
        assert_eq!(snapshot.steps().len(), 2);
    }

    #[test]
    fn run_of_stepless_case_is_rejected() {
        let mut engine = seeded();
        engine
            .create_record(RecordType::TestCase, "Empty", "", Vec::new(), &actor())
            .unwrap();
        let err = engine
            .create_test_run("Smoke", "", &nonempty![id("TC-2")], &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[test]
    fn step_recording_guards() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();

        // Recording before execution has started.
        let err = engine
            .record_step_result(
                id("TR-1"),
                id("TC-1"),
                1,
                StepStatus::Pass,
                "observed",
                None,
                &actor(),
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        engine
            .execute_test_case(id("TR-1"), id("TC-1"), &actor(), None)
            .unwrap();
        let err = engine
            .record_step_result(
                id("TR-1"),
                id("TC-1"),
                3,
                StepStatus::Pass,
                "observed",
                None,
                &actor(),
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn approving_incomplete_run_fails_without_side_effects() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        let before_events = engine.audit().len();

        let err = engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(engine.audit().len(), before_events);
        assert_eq!(engine.iter_results().count(), 0);
    }

    #[test]
    fn approval_materializes_results_links_and_events_in_order() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Fail);

        let run = engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();
        assert_eq!(run.status(), RunStatus::Approved);
        assert_eq!(
            run.overall_result(),
            crate::domain::test_run::RunResult::Fail
        );

        let result = engine.test_result(id("TRES-1")).unwrap();
        assert_eq!(result.result(), CaseResult::Fail);
        assert_eq!(result.run_id(), id("TR-1"));

        let downstream = engine.downstream_of(id("TC-1")).unwrap();
        assert_eq!(downstream.len(), 1);
        assert!(downstream[0].is_system_generated());

        let names: Vec<String> = engine.audit().iter().map(AuditEvent::name).collect();
        let tail = &names[names.len() - 3..];
        assert_eq!(tail, ["TestRunCompleted", "TestRunApproved", "TraceCreated"]);

        // Re-approval is an invalid transition, not a repeat.
        let err = engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(engine.iter_results().count(), 1);
    }

    #[test]
    fn approved_run_is_locked_for_execution_and_edits() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Pass);
        engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        let err = engine
            .execute_test_case(id("TR-1"), id("TC-1"), &actor(), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let err = engine
            .edit_record(
                id("TR-1"),
                RecordPatch {
                    title: Some("Renamed".to_string()),
                    ..RecordPatch::default()
                },
                &actor(),
                None,
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn deleting_a_result_cascades_its_system_link() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Pass);
        engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        engine
            .delete_record(id("TRES-1"), &actor(), None, None)
            .unwrap();
        assert!(engine.test_result(id("TRES-1")).unwrap().is_deleted());
        assert!(engine.downstream_of(id("TC-1")).unwrap().is_empty());

        let names: Vec<String> = engine.audit().iter().map(AuditEvent::name).collect();
        let tail = &names[names.len() - 2..];
        assert_eq!(tail, ["TestResultDeleted", "TraceRemoved"]);
    }

    #[test]
    fn deleting_a_run_keeps_its_results() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Pass);
        engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        engine
            .delete_record(id("TR-1"), &actor(), Some(Credential::Verified), None)
            .unwrap();
        assert_eq!(engine.iter_runs().count(), 0);
        assert_eq!(engine.iter_results().count(), 1);
    }

    #[test]
    fn trace_links_follow_the_whitelist() {
        let mut engine = seeded();
        engine
            .add_trace_link(id("UR-1"), id("SR-1"), &actor())
            .unwrap();
        engine
            .add_trace_link(id("SR-1"), id("TC-1"), &actor())
            .unwrap();

        let err = engine
            .add_trace_link(id("TC-1"), id("UR-1"), &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphConstraintViolation);

        let upstream = engine.upstream_of(id("TC-1")).unwrap();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0].from().id, id("SR-1"));
        let downstream = engine.downstream_of(id("UR-1")).unwrap();
        assert_eq!(downstream.len(), 1);
        assert_eq!(downstream[0].to().id, id("SR-1"));
    }

    #[test]
    fn duplicate_user_link_is_an_idempotent_noop() {
        let mut engine = seeded();
        let first = engine
            .add_trace_link(id("UR-1"), id("SR-1"), &actor())
            .unwrap()
            .id();
        let before_events = engine.audit().len();

        let second = engine
            .add_trace_link(id("UR-1"), id("SR-1"), &actor())
            .unwrap()
            .id();
        assert_eq!(first, second);
        assert_eq!(engine.audit().len(), before_events);
    }

    #[test]
    fn system_links_cannot_be_produced_or_removed_directly() {
        let mut engine = seeded();
        engine
            .create_test_run("Smoke", "", &nonempty![id("TC-1")], &actor())
            .unwrap();
        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Pass);
        engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();

        let err = engine
            .add_trace_link(id("TC-1"), id("TRES-1"), &actor())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphConstraintViolation);

        let system_link = engine.downstream_of(id("TC-1")).unwrap()[0].id();
        let err = engine.remove_trace_link(system_link, &actor()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphConstraintViolation);
    }

    #[test]
    fn removing_a_user_link_emits_an_event() {
        let mut engine = seeded();
        let link = engine
            .add_trace_link(id("UR-1"), id("SR-1"), &actor())
            .unwrap()
            .id();

        engine.remove_trace_link(link, &actor()).unwrap();
        assert!(engine.downstream_of(id("UR-1")).unwrap().is_empty());
        let last = engine.audit().iter().last().unwrap();
        assert_eq!(last.name(), "TraceRemoved");
    }

    #[test]
    fn deleted_endpoints_disappear_from_trace_queries() {
        let mut engine = seeded();
        engine
            .add_trace_link(id("UR-1"), id("SR-1"), &actor())
            .unwrap();
        engine
            .delete_record(id("SR-1"), &actor(), None, None)
            .unwrap();

        assert!(engine.downstream_of(id("UR-1")).unwrap().is_empty());
        let err = engine.upstream_of(id("SR-1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn revision_increments_once_per_approval_and_never_otherwise() {
        let mut engine = seeded();
        assert_eq!(engine.record(id("UR-1")).unwrap().revision(), 0);

        engine
            .approve_record(id("UR-1"), &actor(), Credential::Verified, None)
            .unwrap();
        assert_eq!(engine.record(id("UR-1")).unwrap().revision(), 1);

        let patch = RecordPatch {
            title: Some("Login v2".to_string()),
            ..RecordPatch::default()
        };
        engine
            .edit_record(id("UR-1"), patch, &actor(), Some(Credential::Verified), None)
            .unwrap();
        let record = engine.record(id("UR-1")).unwrap();
        assert_eq!(record.status(), ApprovalStatus::Draft);
        assert_eq!(record.revision(), 1);

        let revision = engine
            .approve_record(id("UR-1"), &actor(), Credential::Verified, None)
            .unwrap();
        assert_eq!(revision, 2);
    }

    #[test]
    fn run_verdict_is_derived_from_the_worst_case() {
        let mut engine = seeded();
        engine
            .create_record(RecordType::TestCase, "Verify logout", "", two_steps(), &actor())
            .unwrap();
        engine
            .create_test_run("Regression", "", &nonempty![id("TC-1"), id("TC-2")], &actor())
            .unwrap();

        use crate::domain::test_run::RunResult;

        complete_case(&mut engine, id("TR-1"), id("TC-1"), StepStatus::Pass);
        let run = engine.test_run(id("TR-1")).unwrap();
        assert_eq!(run.status(), RunStatus::InProgress);
        // No case has failed yet, so the derived overall result stays Pass.
        assert_eq!(run.overall_result(), RunResult::Pass);

        complete_case(&mut engine, id("TR-1"), id("TC-2"), StepStatus::Fail);
        let run = engine.test_run(id("TR-1")).unwrap();
        assert_eq!(run.status(), RunStatus::Complete);
        assert_eq!(run.overall_result(), RunResult::Fail);

        engine
            .approve_test_run(id("TR-1"), &actor(), Credential::Verified, None)
            .unwrap();
        assert_eq!(
            engine.test_result(id("TRES-1")).unwrap().result(),
            CaseResult::Pass
        );
        assert_eq!(
            engine.test_result(id("TRES-2")).unwrap().result(),
            CaseResult::Fail
        );
    }
}
