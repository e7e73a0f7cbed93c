//! Plain-text Requirements Lifecycle Management
//!
//! Requirements, test cases, test runs, and their audit trail are
//! markdown and YAML documents stored in a directory.

pub mod domain;
pub use domain::{
    Actor, AuditFilter, AuditLog, Config, Credential, Record, RecordId, RecordType, TestRun,
    TraceLink,
};

/// In-memory command/query engine over the loaded state.
pub mod store;
pub use store::{CommandError, Engine, ErrorKind, RecordPatch, Registry};

/// Filesystem storage and workspace management.
pub mod storage;
pub use storage::{Workspace, WorkspaceError, WorkspaceLoadError};
