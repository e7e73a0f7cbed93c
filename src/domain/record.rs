use borsh::BorshSerialize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Actor, RecordId, RecordType};

/// Lifecycle position of an approvable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Content is mutable; not yet (or no longer) signed off.
    Draft,
    /// Content is signed off at the current revision.
    Approved,
}

/// The stamp recorded when a record is approved.
///
/// The fingerprint captures the content at the moment of approval; while
/// the record stays `Approved`, its current content must hash to the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// When the approval happened.
    pub at: DateTime<Utc>,
    /// Who approved, snapshotted at approval time.
    pub by: Actor,
    /// Content fingerprint at approval time.
    pub fingerprint: String,
}

/// A guard violation inside the lifecycle state machine.
///
/// The engine wraps these with the record's id for the caller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The record is already in the requested state.
    #[error("record is already {0:?}")]
    AlreadyInState(ApprovalStatus),
    /// The record has been deleted; no further transitions are legal.
    #[error("record has been deleted")]
    Deleted,
    /// The record's state is frozen: approved runs and materialized test
    /// results accept no further content changes.
    #[error("record is frozen and cannot be modified")]
    Frozen,
}

/// The draft→approved→draft state machine shared by every approvable
/// record.
///
/// `Draft → Approved → Draft → Approved → …`, plus a terminal soft-deleted
/// state reachable from either. The revision counter increments exactly
/// once per approval and never otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    status: ApprovalStatus,
    revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approval: Option<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    /// A fresh lifecycle: Draft, revision 0, no approval stamp.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: ApprovalStatus::Draft,
            revision: 0,
            approval: None,
            deleted_at: None,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ApprovalStatus {
        self.status
    }

    /// Current revision. Starts at 0, increments once per approval.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// The active approval stamp, present iff status is `Approved`.
    #[must_use]
    pub const fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    /// Soft-deletion timestamp, if the record was deleted.
    #[must_use]
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the record has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the lifecycle currently sits at `Approved`.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// Draft → Approved. Increments the revision and stamps the approval.
    ///
    /// This is the only transition that changes the revision.
    ///
    /// # Errors
    ///
    /// Fails if the record is deleted or already approved. On failure
    /// nothing is mutated.
    pub fn approve(
        &mut self,
        by: Actor,
        at: DateTime<Utc>,
        fingerprint: String,
    ) -> Result<(), TransitionError> {
        if self.is_deleted() {
            return Err(TransitionError::Deleted);
        }
        if self.status == ApprovalStatus::Approved {
            return Err(TransitionError::AlreadyInState(ApprovalStatus::Approved));
        }

        self.status = ApprovalStatus::Approved;
        self.revision += 1;
        self.approval = Some(Approval {
            at,
            by,
            fingerprint,
        });
        Ok(())
    }

    /// Approved → Draft, as the first half of editing an approved record.
    ///
    /// The revision is unchanged; the approval stamp is cleared so the
    /// `Approved ⇒ stamp present` invariant keeps holding.
    ///
    /// # Errors
    ///
    /// Fails if the record is deleted or already a draft.
    pub fn revert_to_draft(&mut self) -> Result<(), TransitionError> {
        if self.is_deleted() {
            return Err(TransitionError::Deleted);
        }
        if self.status == ApprovalStatus::Draft {
            return Err(TransitionError::AlreadyInState(ApprovalStatus::Draft));
        }

        self.status = ApprovalStatus::Draft;
        self.approval = None;
        Ok(())
    }

    /// Draft or Approved → Deleted (soft). Revision and approval stamp are
    /// left untouched; the record just stops appearing in default queries.
    ///
    /// # Errors
    ///
    /// Fails if the record is already deleted.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.is_deleted() {
            return Err(TransitionError::Deleted);
        }
        self.deleted_at = Some(at);
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of a test case procedure.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, Serialize, Deserialize)]
pub struct TestStep {
    /// What the tester does.
    pub action: String,
    /// What the tester should observe.
    pub expected: String,
}

/// An approvable record: user requirement, system requirement, or test
/// case.
///
/// Pairs a stable [`Uuid`] with a human-readable [`RecordId`], the same
/// split used for requirement identity elsewhere in this crate's storage
/// format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub(crate) uuid: Uuid,
    pub(crate) id: RecordId,
    pub(crate) title: String,
    pub(crate) description: String,
    /// Ordered procedure steps. Only ever non-empty for test cases.
    pub(crate) steps: Vec<TestStep>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: Actor,
    pub(crate) modified_at: DateTime<Utc>,
    pub(crate) modified_by: Actor,
    /// Mutation counter for optimistic concurrency. Bumped once per
    /// committed mutation, including edits that do not touch the revision.
    pub(crate) version: u64,
}

impl Record {
    /// Construct a new draft record. A new UUID is generated.
    #[must_use]
    pub(crate) fn new(
        id: RecordId,
        title: String,
        description: String,
        steps: Vec<TestStep>,
        created_by: Actor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            title,
            description,
            steps,
            lifecycle: Lifecycle::new(),
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

    /// The human-readable, type-prefixed identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// The record type, as encoded in the id prefix.
    #[must_use]
    pub const fn kind(&self) -> RecordType {
        self.id.kind()
    }

    /// The record title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The record description body.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The procedure steps. Empty for anything that is not a test case.
    #[must_use]
    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    /// The lifecycle state machine for this record.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Current revision.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.lifecycle.revision()
    }

    /// Current approval status.
    #[must_use]
    pub const fn status(&self) -> ApprovalStatus {
        self.lifecycle.status()
    }

    /// Whether the record has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Who created the record.
    #[must_use]
    pub const fn created_by(&self) -> &Actor {
        &self.created_by
    }

    /// Last modification timestamp.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Who last modified the record.
    #[must_use]
    pub const fn modified_by(&self) -> &Actor {
        &self.modified_by
    }

    /// The optimistic-concurrency token. Callers pass this back with
    /// mutating commands to detect stale reads.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Hash of the semantically important content (title, description,
    /// steps).
    ///
    /// Captured into the approval stamp on approve; while the record is
    /// `Approved`, the current fingerprint must equal the stamped one.
    ///
    /// # Panics
    ///
    /// Panics if borsh serialization fails, which cannot happen for this
    /// data.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(BorshSerialize)]
        struct FingerprintData<'a> {
            title: &'a str,
            description: &'a str,
            steps: &'a [TestStep],
        }

        let data = FingerprintData {
            title: &self.title,
            description: &self.description,
            steps: &self.steps,
        };

        let encoded = borsh::to_vec(&data).expect("this should never fail");
        let hash = Sha256::digest(encoded);
        format!("{hash:x}")
    }

    /// Checks the approved-content consistency invariant: if the record is
    /// `Approved`, its current content hashes to the fingerprint stamped
    /// at approval time.
    #[must_use]
    pub fn is_content_consistent(&self) -> bool {
        match self.lifecycle.approval() {
            Some(approval) if self.lifecycle.is_approved() => {
                approval.fingerprint == self.fingerprint()
            }
            Some(_) => false, // stamp present while Draft
            None => !self.lifecycle.is_approved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::new("u1", "u1@example.com", "User One")
    }

    fn record() -> Record {
        Record::new(
            "UR-1".parse().unwrap(),
            "Title".to_string(),
            "Description".to_string(),
            Vec::new(),
            actor(),
            Utc::now(),
        )
    }

    #[test]
    fn new_record_is_draft_revision_zero() {
        let r = record();
        assert_eq!(r.status(), ApprovalStatus::Draft);
        assert_eq!(r.revision(), 0);
        assert!(r.lifecycle().approval().is_none());
        assert!(!r.is_deleted());
    }

    #[test]
    fn approve_increments_revision_and_stamps() {
        let mut r = record();
        let fp = r.fingerprint();
        r.lifecycle
            .approve(actor(), Utc::now(), fp.clone())
            .unwrap();

        assert_eq!(r.status(), ApprovalStatus::Approved);
        assert_eq!(r.revision(), 1);
        assert_eq!(r.lifecycle().approval().unwrap().fingerprint, fp);
        assert!(r.is_content_consistent());
    }

    #[test]
    fn double_approve_is_rejected_without_mutation() {
        let mut r = record();
        let fp = r.fingerprint();
        r.lifecycle.approve(actor(), Utc::now(), fp.clone()).unwrap();

        let err = r.lifecycle.approve(actor(), Utc::now(), fp).unwrap_err();
        assert_eq!(
            err,
            TransitionError::AlreadyInState(ApprovalStatus::Approved)
        );
        assert_eq!(r.revision(), 1);
    }

    #[test]
    fn revert_keeps_revision_and_clears_stamp() {
        let mut r = record();
        r.lifecycle
            .approve(actor(), Utc::now(), r.fingerprint())
            .unwrap();
        r.lifecycle.revert_to_draft().unwrap();

        assert_eq!(r.status(), ApprovalStatus::Draft);
        assert_eq!(r.revision(), 1);
        assert!(r.lifecycle().approval().is_none());
        assert!(r.is_content_consistent());
    }

    #[test]
    fn revision_monotonicity_over_cycles() {
        let mut r = record();
        for expected in 1..=3 {
            r.lifecycle
                .approve(actor(), Utc::now(), r.fingerprint())
                .unwrap();
            assert_eq!(r.revision(), expected);
            r.lifecycle.revert_to_draft().unwrap();
            assert_eq!(r.revision(), expected);
        }
    }

    #[test]
    fn deleted_blocks_all_transitions() {
        let mut r = record();
        r.lifecycle.mark_deleted(Utc::now()).unwrap();

        assert_eq!(
            r.lifecycle.approve(actor(), Utc::now(), r.fingerprint()),
            Err(TransitionError::Deleted)
        );
        assert_eq!(r.lifecycle.revert_to_draft(), Err(TransitionError::Deleted));
        assert_eq!(
            r.lifecycle.mark_deleted(Utc::now()),
            Err(TransitionError::Deleted)
        );
    }

    #[test]
    fn edit_breaks_content_consistency_until_reverted() {
        let mut r = record();
        r.lifecycle
            .approve(actor(), Utc::now(), r.fingerprint())
            .unwrap();

        // An edit that does not revert first leaves an inconsistent record;
        // the engine always reverts in the same commit.
        r.title = "Changed".to_string();
        assert!(!r.is_content_consistent());

        r.lifecycle.revert_to_draft().unwrap();
        assert!(r.is_content_consistent());
    }

    #[test]
    fn fingerprint_covers_steps() {
        let mut r = record();
        let before = r.fingerprint();
        r.steps.push(TestStep {
            action: "Do".to_string(),
            expected: "See".to_string(),
        });
        assert_ne!(before, r.fingerprint());
    }
}
