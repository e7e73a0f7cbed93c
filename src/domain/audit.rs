//! The append-only audit ledger.
//!
//! Every committed state change appends exactly one event (composite
//! operations append several) in the same unit of work as the mutation.
//! The log exposes append and read-only queries; there is no update or
//! delete surface.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    test_run::{RunResult, StepStatus},
    trace::LinkId,
    Actor, RecordId, RecordType,
};

/// Coarse event category, used for filtering and metrics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Requirement lifecycle events (user and system requirements).
    Requirements,
    /// Test case, test run, and test result lifecycle events.
    Testing,
    /// Trace link creation and removal.
    Traceability,
}

/// The structured payload of an audit event: what happened, carrying the
/// delta or post-state relevant to that event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditPayload {
    /// A record or run was created as a draft.
    Created {
        /// Title at creation time.
        title: String,
    },
    /// Title, description, or steps actually changed value.
    Updated {
        /// Content fingerprint before the edit.
        old_fingerprint: String,
        /// Content fingerprint after the edit.
        new_fingerprint: String,
    },
    /// A draft was approved; revision incremented.
    Approved {
        /// The revision produced by this approval.
        revision: u32,
    },
    /// An approved record was flipped back to draft by an edit.
    RevertedToDraft {
        /// The revision, unchanged by the revert.
        revision: u32,
    },
    /// A record, run, or result was soft-deleted.
    Deleted,
    /// Execution of a case within a run started (or restarted).
    ExecutionStarted {
        /// The case being executed.
        test_case: RecordId,
    },
    /// A step result was recorded for a case within a run.
    StepRecorded {
        /// The case being executed.
        test_case: RecordId,
        /// 1-based step number.
        step: usize,
        /// The recorded status.
        status: StepStatus,
    },
    /// The run was observed complete, at the moment of approval.
    Completed {
        /// The derived overall result.
        result: RunResult,
    },
    /// The run was approved; results and links were materialized.
    RunApproved {
        /// The frozen overall result.
        result: RunResult,
        /// The revision produced by this approval.
        revision: u32,
        /// Ids of the materialized test results.
        results: Vec<RecordId>,
    },
    /// A trace link was created.
    TraceCreated {
        /// The new link.
        link: LinkId,
        /// Upstream endpoint.
        from: RecordId,
        /// Downstream endpoint.
        to: RecordId,
        /// Whether the link was materialized by run approval.
        system_generated: bool,
    },
    /// A trace link was removed.
    TraceRemoved {
        /// The removed link.
        link: LinkId,
        /// Upstream endpoint.
        from: RecordId,
        /// Downstream endpoint.
        to: RecordId,
    },
}

impl AuditPayload {
    /// The action suffix used to build the event name.
    #[must_use]
    const fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Created",
            Self::Updated { .. } => "Updated",
            Self::Approved { .. } | Self::RunApproved { .. } => "Approved",
            Self::RevertedToDraft { .. } => "RevertedToDraft",
            Self::Deleted => "Deleted",
            Self::ExecutionStarted { .. } => "ExecutionStarted",
            Self::StepRecorded { .. } => "StepRecorded",
            Self::Completed { .. } => "Completed",
            Self::TraceCreated { .. } => "TraceCreated",
            Self::TraceRemoved { .. } => "TraceRemoved",
        }
    }

    const fn is_trace(&self) -> bool {
        matches!(self, Self::TraceCreated { .. } | Self::TraceRemoved { .. })
    }
}

/// One immutable entry in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Insertion order within the ledger; ties on `occurred_at` are broken
    /// by this.
    pub sequence: u64,
    /// When the mutation committed.
    pub occurred_at: DateTime<Utc>,
    /// Coarse category.
    pub category: EventCategory,
    /// Type of the aggregate the event is about.
    pub aggregate_type: RecordType,
    /// Id of the aggregate the event is about.
    pub aggregate_id: RecordId,
    /// Snapshot of the acting user at event time.
    pub actor: Actor,
    /// What happened.
    pub payload: AuditPayload,
}

impl AuditEvent {
    /// The specific event name, e.g. `SystemRequirementApproved` or
    /// `TraceCreated`.
    #[must_use]
    pub fn name(&self) -> String {
        if self.payload.is_trace() {
            self.payload.action().to_string()
        } else {
            format!("{}{}", self.aggregate_type.label(), self.payload.action())
        }
    }
}

/// Filter for [`AuditLog::trail`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only events about this aggregate.
    pub aggregate: Option<RecordId>,
    /// Only events in this category.
    pub category: Option<EventCategory>,
    /// Only events by this actor id.
    pub actor: Option<String>,
    /// Only events at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only events strictly before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.aggregate.is_none_or(|id| event.aggregate_id == id)
            && self.category.is_none_or(|c| event.category == c)
            && self
                .actor
                .as_ref()
                .is_none_or(|actor| event.actor.id == *actor)
            && self.since.is_none_or(|t| event.occurred_at >= t)
            && self.until.is_none_or(|t| event.occurred_at < t)
    }
}

/// Per-actor activity rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    /// Actor id.
    pub actor_id: String,
    /// Display name from the most recent event.
    pub name: String,
    /// Number of events attributed to this actor.
    pub events: u64,
    /// Timestamp of the actor's first event.
    pub first_activity: DateTime<Utc>,
    /// Timestamp of the actor's most recent event.
    pub last_activity: DateTime<Utc>,
}

/// Per-day event counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyMetrics {
    /// The UTC day.
    pub date: NaiveDate,
    /// Total events on that day.
    pub total: u64,
    /// Events by category on that day.
    pub by_category: BTreeMap<EventCategory, u64>,
}

/// The append-only event ledger.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    /// An empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Rebuild a ledger from previously journalled events.
    ///
    /// Events are assumed to be in their original insertion order.
    #[must_use]
    pub fn from_events(events: Vec<AuditEvent>) -> Self {
        Self { events }
    }

    /// Append an event, assigning the next sequence number and deriving
    /// the category from the payload and aggregate type.
    pub fn append(
        &mut self,
        occurred_at: DateTime<Utc>,
        actor: Actor,
        aggregate_type: RecordType,
        aggregate_id: RecordId,
        payload: AuditPayload,
    ) -> &AuditEvent {
        let category = if payload.is_trace() {
            EventCategory::Traceability
        } else {
            match aggregate_type {
                RecordType::UserRequirement | RecordType::SystemRequirement => {
                    EventCategory::Requirements
                }
                RecordType::TestCase | RecordType::TestRun | RecordType::TestResult => {
                    EventCategory::Testing
                }
            }
        };

        let event = AuditEvent {
            sequence: self.events.len() as u64,
            occurred_at,
            category,
            aggregate_type,
            aggregate_id,
            actor,
            payload,
        };
        self.events.push(event);
        self.events.last().expect("just pushed")
    }

    /// Number of events in the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over all events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter()
    }

    /// Events appended after the first `n`. Used by storage to journal
    /// exactly the events a commit produced.
    #[must_use]
    pub fn events_after(&self, n: usize) -> &[AuditEvent] {
        &self.events[n.min(self.events.len())..]
    }

    /// The filtered trail, ordered by `occurred_at` then insertion order.
    #[must_use]
    pub fn trail(&self, filter: &AuditFilter) -> Vec<&AuditEvent> {
        let mut matched: Vec<&AuditEvent> =
            self.events.iter().filter(|e| filter.matches(e)).collect();
        matched.sort_by_key(|e| (e.occurred_at, e.sequence));
        matched
    }

    /// Per-actor rollup of event counts and first/last activity, ordered
    /// by actor id.
    #[must_use]
    pub fn user_activity_summary(&self) -> Vec<UserActivity> {
        let mut by_actor: BTreeMap<&str, UserActivity> = BTreeMap::new();

        for event in &self.events {
            by_actor
                .entry(&event.actor.id)
                .and_modify(|activity| {
                    activity.events += 1;
                    activity.first_activity = activity.first_activity.min(event.occurred_at);
                    activity.last_activity = activity.last_activity.max(event.occurred_at);
                    activity.name.clone_from(&event.actor.name);
                })
                .or_insert_with(|| UserActivity {
                    actor_id: event.actor.id.clone(),
                    name: event.actor.name.clone(),
                    events: 1,
                    first_activity: event.occurred_at,
                    last_activity: event.occurred_at,
                });
        }

        by_actor.into_values().collect()
    }

    /// Per-UTC-day event counts by category, in date order.
    #[must_use]
    pub fn daily_metrics(&self) -> Vec<DailyMetrics> {
        let mut by_day: BTreeMap<NaiveDate, DailyMetrics> = BTreeMap::new();

        for event in &self.events {
            let date = event.occurred_at.date_naive();
            let metrics = by_day.entry(date).or_insert_with(|| DailyMetrics {
                date,
                total: 0,
                by_category: BTreeMap::new(),
            });
            metrics.total += 1;
            *metrics.by_category.entry(event.category).or_insert(0) += 1;
        }

        by_day.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn actor(id: &str) -> Actor {
        Actor::new(id, format!("{id}@example.com"), id.to_uppercase())
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
    }

    fn seed() -> AuditLog {
        let mut log = AuditLog::new();
        log.append(
            at(1, 9),
            actor("alice"),
            RecordType::SystemRequirement,
            "SR-1".parse().unwrap(),
            AuditPayload::Created {
                title: "Login".to_string(),
            },
        );
        log.append(
            at(1, 10),
            actor("alice"),
            RecordType::SystemRequirement,
            "SR-1".parse().unwrap(),
            AuditPayload::Approved { revision: 1 },
        );
        log.append(
            at(2, 8),
            actor("bob"),
            RecordType::TestCase,
            "TC-1".parse().unwrap(),
            AuditPayload::Created {
                title: "Verify login".to_string(),
            },
        );
        log
    }

    #[test]
    fn event_names_combine_type_and_action() {
        let log = seed();
        let names: Vec<String> = log.iter().map(AuditEvent::name).collect();
        assert_eq!(
            names,
            [
                "SystemRequirementCreated",
                "SystemRequirementApproved",
                "TestCaseCreated"
            ]
        );
    }

    #[test]
    fn trace_events_keep_plain_names() {
        let mut log = AuditLog::new();
        let event = log.append(
            at(1, 9),
            actor("alice"),
            RecordType::UserRequirement,
            "UR-1".parse().unwrap(),
            AuditPayload::TraceCreated {
                link: LinkId::generate(),
                from: "UR-1".parse().unwrap(),
                to: "SR-1".parse().unwrap(),
                system_generated: false,
            },
        );
        assert_eq!(event.name(), "TraceCreated");
        assert_eq!(event.category, EventCategory::Traceability);
    }

    #[test]
    fn category_derivation() {
        let log = seed();
        let categories: Vec<EventCategory> = log.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            [
                EventCategory::Requirements,
                EventCategory::Requirements,
                EventCategory::Testing
            ]
        );
    }

    #[test]
    fn trail_filters_by_aggregate() {
        let log = seed();
        let filter = AuditFilter {
            aggregate: Some("SR-1".parse().unwrap()),
            ..AuditFilter::default()
        };
        let trail = log.trail(&filter);
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|e| e.aggregate_id.to_string() == "SR-1"));
    }

    #[test]
    fn trail_filters_by_actor_and_time() {
        let log = seed();
        let filter = AuditFilter {
            actor: Some("alice".to_string()),
            since: Some(at(1, 10)),
            ..AuditFilter::default()
        };
        let trail = log.trail(&filter);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].name(), "SystemRequirementApproved");
    }

    #[test]
    fn trail_is_ordered_by_time_then_sequence() {
        let mut log = AuditLog::new();
        // Same timestamp; sequence breaks the tie.
        log.append(
            at(1, 9),
            actor("a"),
            RecordType::UserRequirement,
            "UR-1".parse().unwrap(),
            AuditPayload::Created {
                title: "x".to_string(),
            },
        );
        log.append(
            at(1, 9),
            actor("a"),
            RecordType::UserRequirement,
            "UR-1".parse().unwrap(),
            AuditPayload::Approved { revision: 1 },
        );
        let trail = log.trail(&AuditFilter::default());
        assert_eq!(trail[0].sequence, 0);
        assert_eq!(trail[1].sequence, 1);
    }

    #[test]
    fn user_activity_summary_rolls_up() {
        let log = seed();
        let summary = log.user_activity_summary();
        assert_eq!(summary.len(), 2);

        let alice = &summary[0];
        assert_eq!(alice.actor_id, "alice");
        assert_eq!(alice.events, 2);
        assert_eq!(alice.first_activity, at(1, 9));
        assert_eq!(alice.last_activity, at(1, 10));
    }

    #[test]
    fn daily_metrics_count_by_day_and_category() {
        let log = seed();
        let metrics = log.daily_metrics();
        assert_eq!(metrics.len(), 2);

        assert_eq!(metrics[0].total, 2);
        assert_eq!(
            metrics[0].by_category[&EventCategory::Requirements],
            2
        );
        assert_eq!(metrics[1].total, 1);
        assert_eq!(metrics[1].by_category[&EventCategory::Testing], 1);
    }

    #[test]
    fn journal_roundtrip_preserves_events() {
        let log = seed();
        let lines: Vec<String> = log
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect();
        let restored: Vec<AuditEvent> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let restored = AuditLog::from_events(restored);
        assert_eq!(restored.len(), log.len());
        assert!(log.iter().zip(restored.iter()).all(|(a, b)| a == b));
    }
}
