use std::{fmt, num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Serialize};

/// The closed set of record types managed by the core.
///
/// Each type reserves a unique identifier prefix. Prefixes never collide
/// across types, so an id string always names exactly one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A user-level requirement (`UR`).
    UserRequirement,
    /// A system-level requirement derived from user requirements (`SR`).
    SystemRequirement,
    /// A test case with ordered execution steps (`TC`).
    TestCase,
    /// A test run executing a snapshot of test cases (`TR`).
    TestRun,
    /// A test result materialized when a test run is approved (`TRES`).
    TestResult,
}

impl RecordType {
    /// All record types, in trace-graph order.
    pub const ALL: [Self; 5] = [
        Self::UserRequirement,
        Self::SystemRequirement,
        Self::TestCase,
        Self::TestRun,
        Self::TestResult,
    ];

    /// The reserved identifier prefix for this type.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::UserRequirement => "UR",
            Self::SystemRequirement => "SR",
            Self::TestCase => "TC",
            Self::TestRun => "TR",
            Self::TestResult => "TRES",
        }
    }

    /// The `PascalCase` label used to build audit event names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UserRequirement => "UserRequirement",
            Self::SystemRequirement => "SystemRequirement",
            Self::TestCase => "TestCase",
            Self::TestRun => "TestRun",
            Self::TestResult => "TestResult",
        }
    }

    /// Look up a record type from its prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    /// Whether records of this type move through the draft→approved
    /// lifecycle. Test results are synthetic and never approvable.
    #[must_use]
    pub const fn is_approvable(self) -> bool {
        !matches!(self, Self::TestResult)
    }

    /// Whether the caller may create records of this type directly.
    ///
    /// Test runs are created through `create_test_run`; test results only
    /// ever materialize when a run is approved.
    #[must_use]
    pub const fn is_user_creatable(self) -> bool {
        matches!(
            self,
            Self::UserRequirement | Self::SystemRequirement | Self::TestCase
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A human-readable, type-prefixed record identifier such as `UR-12` or
/// `TRES-4`.
///
/// Ids are immutable once assigned and ordered by `(type, index)`, which
/// allows sequential index allocation via a `BTreeMap` range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    kind: RecordType,
    index: NonZeroUsize,
}

impl RecordId {
    /// Create an id from pre-validated parts.
    #[must_use]
    pub const fn new(kind: RecordType, index: NonZeroUsize) -> Self {
        Self { kind, index }
    }

    /// The record type encoded in the prefix.
    #[must_use]
    pub const fn kind(self) -> RecordType {
        self.kind
    }

    /// The sequential index component.
    #[must_use]
    pub const fn index(self) -> NonZeroUsize {
        self.index
    }

    /// The smallest possible id of a given type. Used as the lower bound of
    /// range queries.
    #[must_use]
    pub const fn first(kind: RecordType) -> Self {
        Self::new(kind, NonZeroUsize::MIN)
    }

    /// The largest possible id of a given type. Used as the upper bound of
    /// range queries.
    #[must_use]
    pub const fn last(kind: RecordType) -> Self {
        Self::new(kind, NonZeroUsize::MAX)
    }

    /// Returns a displayable representation padding the index to the given
    /// digit width, e.g. `UR-012` for `display(3)`.
    #[must_use]
    pub const fn display(&self, digits: usize) -> FormattedRecordId<'_> {
        FormattedRecordId { id: self, digits }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.kind.prefix(), self.index)
    }
}

/// A wrapper that formats a [`RecordId`] with a fixed index digit width.
#[derive(Debug, Clone, Copy)]
pub struct FormattedRecordId<'a> {
    id: &'a RecordId,
    digits: usize,
}

impl fmt::Display for FormattedRecordId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.id.kind.prefix(),
            self.id.index,
            width = self.digits
        )
    }
}

/// Errors that can occur when parsing a record id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseIdError {
    /// The string is not of the form `PREFIX-N`.
    #[error("invalid record id '{0}': expected PREFIX-N")]
    Syntax(String),

    /// The prefix does not name a known record type.
    #[error("unknown record type prefix '{0}'")]
    UnknownPrefix(String),

    /// The index is not a positive integer.
    #[error("invalid index in record id '{0}': expected a non-zero integer, got '{1}'")]
    Index(String, String),
}

impl FromStr for RecordId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, index_str) = s
            .split_once('-')
            .ok_or_else(|| ParseIdError::Syntax(s.to_string()))?;

        if prefix.is_empty() || index_str.is_empty() || index_str.contains('-') {
            return Err(ParseIdError::Syntax(s.to_string()));
        }

        let kind = RecordType::from_prefix(prefix)
            .ok_or_else(|| ParseIdError::UnknownPrefix(prefix.to_string()))?;

        let index = index_str
            .parse::<usize>()
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| ParseIdError::Index(s.to_string(), index_str.to_string()))?;

        Ok(Self::new(kind, index))
    }
}

impl TryFrom<&str> for RecordId {
    type Error = ParseIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
