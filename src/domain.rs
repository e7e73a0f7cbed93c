//! Domain models for auditable requirements and test management.
//!
//! This module contains the core domain types: records and their
//! lifecycle, test runs and results, traceability links, the audit
//! event vocabulary, and configuration.

/// Actors and credential verification.
pub mod actor;
pub use actor::{Actor, Credential};

/// Audit events, filtering, and reporting.
pub mod audit;
pub use audit::{AuditEvent, AuditFilter, AuditLog, AuditPayload, EventCategory};

mod config;
pub use config::Config;

/// Records and their approval lifecycle.
pub mod record;
pub use record::{Approval, ApprovalStatus, Lifecycle, Record, TestStep, TransitionError};

/// Typed record identifiers and parsing.
pub mod record_id;
pub use record_id::{FormattedRecordId, ParseIdError, RecordId, RecordType};

/// Test run execution and result derivation.
pub mod test_run;
pub use test_run::{
    CaseResult, CaseStatus, RunResult, RunStatus, StepResult, StepStatus, TestResult, TestRun,
    TestRunCase, derive_run_state,
};

/// Traceability links between records.
pub mod trace;
pub use trace::{LinkId, TraceEnd, TraceError, TraceLink};
