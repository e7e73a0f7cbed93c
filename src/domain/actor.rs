use serde::{Deserialize, Serialize};

/// The acting user for a command.
///
/// Session mechanics are outside this core; callers resolve whoever is
/// authenticated into an explicit `Actor` and pass it into every command.
/// Audit events store a snapshot of these fields as they were at event
/// time, never a reference to be joined later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque identifier in the external user directory.
    pub id: String,
    /// Email address at the time of the action.
    pub email: String,
    /// Display name at the time of the action.
    pub name: String,
}

impl Actor {
    /// Build an actor context.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
        }
    }
}

/// Outcome of the external credential verification call.
///
/// Approval, deletion of approved records, and edits to approved records
/// require the actor to re-verify their credential. The mechanism is
/// external; the core only consumes the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// The credential check passed.
    Verified,
    /// The credential check failed or was not performed.
    Rejected,
}

impl Credential {
    /// Whether the gated transition may proceed.
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}
