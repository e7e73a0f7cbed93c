//! Persistence for the workspace.
//!
//! Records, runs, and results are stored as individual files (markdown
//! with YAML frontmatter for records and runs, plain YAML for results).
//! Trace links live in a single JSON snapshot and the audit log is an
//! append-only JSONL journal. The [`Workspace`] ties it all together
//! with a load-everything/persist-on-command lifecycle.

pub mod journal;
pub mod markdown;
pub mod run_file;
pub mod workspace;

pub use journal::JournalError;
pub use markdown::{LoadError, MarkdownRecord};
pub use run_file::MarkdownRun;
pub use workspace::{Loaded, Unloaded, Workspace, WorkspaceError, WorkspaceLoadError};
