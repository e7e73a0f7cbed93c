//! Directed traceability links between records.
//!
//! The endpoint whitelist is the closed type ordering
//! `user → system → test case → test result`. That ordering has no
//! back-edges, so the graph is acyclic by construction and no runtime
//! cycle check is needed. Relaxing the whitelist requires re-deriving
//! that guarantee.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Actor, RecordId, RecordType};

/// Stable identifier of a trace link.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Generate a fresh link id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LinkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One endpoint of a trace link: the stable UUID plus the human-readable
/// id, which carries the endpoint's type in its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEnd {
    /// Stable identifier of the endpoint record.
    pub uuid: Uuid,
    /// Human-readable identifier of the endpoint record.
    pub id: RecordId,
}

/// A directed edge in the traceability graph.
///
/// Immutable once created; the only mutation is hard deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLink {
    pub(crate) id: LinkId,
    pub(crate) from: TraceEnd,
    pub(crate) to: TraceEnd,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) created_by: Actor,
    /// `true` for edges materialized by test run approval
    /// (test case → test result). Such edges cannot be created or removed
    /// by a direct caller action.
    pub(crate) system_generated: bool,
}

impl TraceLink {
    /// The link's stable identifier.
    #[must_use]
    pub const fn id(&self) -> LinkId {
        self.id
    }

    /// The upstream endpoint.
    #[must_use]
    pub const fn from(&self) -> TraceEnd {
        self.from
    }

    /// The downstream endpoint.
    #[must_use]
    pub const fn to(&self) -> TraceEnd {
        self.to
    }

    /// When the link was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Who created the link.
    #[must_use]
    pub const fn created_by(&self) -> &Actor {
        &self.created_by
    }

    /// Whether the link was materialized by a run approval.
    #[must_use]
    pub const fn is_system_generated(&self) -> bool {
        self.system_generated
    }
}

/// Whether a directed edge between these record types is ever legal.
#[must_use]
pub const fn edge_allowed(from: RecordType, to: RecordType) -> bool {
    matches!(
        (from, to),
        (RecordType::UserRequirement, RecordType::SystemRequirement)
            | (RecordType::SystemRequirement, RecordType::TestCase)
            | (RecordType::TestCase, RecordType::TestResult)
    )
}

/// Whether an edge between these types may be created by a direct caller
/// action. Test case → test result edges are reserved for run approval.
#[must_use]
pub const fn edge_user_creatable(from: RecordType, to: RecordType) -> bool {
    edge_allowed(from, to) && !matches!(to, RecordType::TestResult)
}

/// Trace graph constraint violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceError {
    /// The `(from, to)` type pair is not in the whitelist.
    #[error("trace link {from} → {to} is not a permitted type pair")]
    DisallowedPair {
        /// Type of the upstream endpoint.
        from: RecordType,
        /// Type of the downstream endpoint.
        to: RecordType,
    },

    /// A record cannot be linked to itself.
    #[error("trace link from {id} to itself is not permitted")]
    SelfLoop {
        /// The offending record.
        id: RecordId,
    },

    /// The identical edge already exists as a system-generated link, so
    /// the caller's request conflicts with it.
    #[error("trace link {from} → {to} already exists as a system-generated link")]
    DuplicateOfSystemLink {
        /// Upstream endpoint.
        from: RecordId,
        /// Downstream endpoint.
        to: RecordId,
    },

    /// Test case → test result edges can only be materialized by run
    /// approval, never created directly.
    #[error("trace links into {to} are system-generated and cannot be created directly")]
    SystemPairReserved {
        /// The test result the caller tried to link into.
        to: RecordId,
    },

    /// System-generated links are removed only by deleting the
    /// originating test result.
    #[error("trace link {link} is system-generated and cannot be removed directly")]
    SystemLinkImmutable {
        /// The protected link.
        link: LinkId,
    },
}
