//! In-memory registry of records, runs, results, and the trace graph.
//!
//! The [`Registry`] knows nothing about the filesystem. It stores each
//! aggregate kind in its own map, keyed by UUID, with a shared ordered
//! id index for lookup and sequential index allocation.

use std::{
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
};

use petgraph::{graphmap::DiGraphMap, Direction};
use uuid::Uuid;

use crate::domain::{LinkId, Record, RecordId, RecordType, TestResult, TestRun, TraceLink};

/// Decomposed in-memory storage for all aggregates.
///
/// - Records, runs, and results: `HashMap<Uuid, _>` per aggregate kind.
/// - Id lookup: `BTreeMap<RecordId, Uuid>` shared across kinds; ids order
///   by `(type, index)`, so the next free index per type is a range query.
/// - Trace graph: `DiGraphMap<Uuid, LinkId>` with edges pointing
///   downstream; link payloads live in a side map so edges stay `Copy`.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<Uuid, Record>,
    runs: HashMap<Uuid, TestRun>,
    results: HashMap<Uuid, TestResult>,

    /// Forward lookup from human-readable id to UUID, for every kind.
    ids: BTreeMap<RecordId, Uuid>,

    /// Trace graph. Nodes are record UUIDs, edges point from upstream to
    /// downstream.
    graph: DiGraphMap<Uuid, LinkId>,
    links: HashMap<LinkId, TraceLink>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with pre-allocated capacity for the given number
    /// of records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
            runs: HashMap::new(),
            results: HashMap::new(),
            ids: BTreeMap::new(),
            graph: DiGraphMap::with_capacity(capacity, capacity * 2),
            links: HashMap::new(),
        }
    }

    /// Returns the next available index for an id of the given type.
    ///
    /// A range query on the id index finds the maximum assigned index for
    /// the type in O(log n). Deleted records keep their ids, so indexes
    /// never regress or get reused.
    ///
    /// # Panics
    ///
    /// Panics on index overflow.
    #[must_use]
    pub fn next_index(&self, kind: RecordType) -> NonZeroUsize {
        let start = RecordId::first(kind);
        let end = RecordId::last(kind);

        self.ids
            .range(start..=end)
            .next_back()
            .map_or(NonZeroUsize::MIN, |(id, _)| {
                id.index().checked_add(1).expect("record index overflow!")
            })
    }

    /// Inserts a record.
    ///
    /// # Panics
    ///
    /// Panics if the UUID or id is already present.
    pub fn insert_record(&mut self, record: Record) {
        let uuid = record.uuid();
        assert!(
            !self.records.contains_key(&uuid),
            "Duplicate record UUID: {uuid}"
        );
        self.index_id(record.id(), uuid);
        self.graph.add_node(uuid);
        self.records.insert(uuid, record);
    }

    /// Inserts a test run.
    ///
    /// # Panics
    ///
    /// Panics if the UUID or id is already present.
    pub fn insert_run(&mut self, run: TestRun) {
        let uuid = run.uuid();
        assert!(!self.runs.contains_key(&uuid), "Duplicate run UUID: {uuid}");
        self.index_id(run.id(), uuid);
        self.runs.insert(uuid, run);
    }

    /// Inserts a test result.
    ///
    /// # Panics
    ///
    /// Panics if the UUID or id is already present.
    pub fn insert_result(&mut self, result: TestResult) {
        let uuid = result.uuid();
        assert!(
            !self.results.contains_key(&uuid),
            "Duplicate result UUID: {uuid}"
        );
        self.index_id(result.id(), uuid);
        self.graph.add_node(uuid);
        self.results.insert(uuid, result);
    }

    fn index_id(&mut self, id: RecordId, uuid: Uuid) {
        let previous = self.ids.insert(id, uuid);
        assert!(previous.is_none(), "Duplicate record id: {id}");
    }

    /// Looks up the UUID assigned to an id.
    #[must_use]
    pub fn uuid_of(&self, id: RecordId) -> Option<Uuid> {
        self.ids.get(&id).copied()
    }

    /// Retrieves a record by UUID.
    #[must_use]
    pub fn record(&self, uuid: Uuid) -> Option<&Record> {
        self.records.get(&uuid)
    }

    pub(crate) fn record_mut(&mut self, uuid: Uuid) -> Option<&mut Record> {
        self.records.get_mut(&uuid)
    }

    /// Retrieves a record by its human-readable id.
    #[must_use]
    pub fn record_by_id(&self, id: RecordId) -> Option<&Record> {
        self.record(self.uuid_of(id)?)
    }

    pub(crate) fn record_by_id_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        let uuid = self.uuid_of(id)?;
        self.record_mut(uuid)
    }

    /// Retrieves a test run by UUID.
    #[must_use]
    pub fn run(&self, uuid: Uuid) -> Option<&TestRun> {
        self.runs.get(&uuid)
    }

    /// Retrieves a test run by its human-readable id.
    #[must_use]
    pub fn run_by_id(&self, id: RecordId) -> Option<&TestRun> {
        self.run(self.uuid_of(id)?)
    }

    pub(crate) fn run_by_id_mut(&mut self, id: RecordId) -> Option<&mut TestRun> {
        let uuid = self.uuid_of(id)?;
        self.runs.get_mut(&uuid)
    }

    /// Retrieves a test result by UUID.
    #[must_use]
    pub fn result(&self, uuid: Uuid) -> Option<&TestResult> {
        self.results.get(&uuid)
    }

    /// Retrieves a test result by its human-readable id.
    #[must_use]
    pub fn result_by_id(&self, id: RecordId) -> Option<&TestResult> {
        self.result(self.uuid_of(id)?)
    }

    pub(crate) fn result_by_id_mut(&mut self, id: RecordId) -> Option<&mut TestResult> {
        let uuid = self.uuid_of(id)?;
        self.results.get_mut(&uuid)
    }

    /// Iterates over all records in id order, deleted included.
    pub fn iter_records(&self) -> impl Iterator<Item = &Record> {
        self.ids.values().filter_map(|uuid| self.records.get(uuid))
    }

    /// Iterates over all runs in id order, deleted included.
    pub fn iter_runs(&self) -> impl Iterator<Item = &TestRun> {
        self.ids.values().filter_map(|uuid| self.runs.get(uuid))
    }

    /// Iterates over all results in id order, deleted included.
    pub fn iter_results(&self) -> impl Iterator<Item = &TestResult> {
        self.ids.values().filter_map(|uuid| self.results.get(uuid))
    }

    /// Inserts a trace link, registering its edge in the graph.
    ///
    /// # Panics
    ///
    /// Panics if the link id is already present.
    pub fn insert_link(&mut self, link: TraceLink) {
        let id = link.id();
        assert!(
            !self.links.contains_key(&id),
            "Duplicate trace link id: {id}"
        );
        self.graph.add_edge(link.from().uuid, link.to().uuid, id);
        self.links.insert(id, link);
    }

    /// Removes a trace link and its graph edge, returning the link if it
    /// existed.
    pub fn remove_link(&mut self, id: LinkId) -> Option<TraceLink> {
        let link = self.links.remove(&id)?;
        self.graph.remove_edge(link.from().uuid, link.to().uuid);
        Some(link)
    }

    /// Retrieves a trace link by id.
    #[must_use]
    pub fn link(&self, id: LinkId) -> Option<&TraceLink> {
        self.links.get(&id)
    }

    /// The link between two endpoints, if one exists.
    #[must_use]
    pub fn edge_between(&self, from: Uuid, to: Uuid) -> Option<&TraceLink> {
        let id = self.graph.edge_weight(from, to)?;
        self.links.get(id)
    }

    /// Outgoing (downstream) links of a record.
    pub fn links_from(&self, uuid: Uuid) -> impl Iterator<Item = &TraceLink> + '_ {
        self.directed_links(uuid, Direction::Outgoing)
    }

    /// Incoming (upstream) links of a record.
    pub fn links_to(&self, uuid: Uuid) -> impl Iterator<Item = &TraceLink> + '_ {
        self.directed_links(uuid, Direction::Incoming)
    }

    fn directed_links(
        &self,
        uuid: Uuid,
        direction: Direction,
    ) -> impl Iterator<Item = &TraceLink> + '_ {
        if self.graph.contains_node(uuid) {
            Some(
                self.graph
                    .edges_directed(uuid, direction)
                    .filter_map(|(_, _, id)| self.links.get(id)),
            )
        } else {
            None
        }
        .into_iter()
        .flatten()
    }

    /// Iterates over all trace links, in no particular order.
    pub fn iter_links(&self) -> impl Iterator<Item = &TraceLink> {
        self.links.values()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{Actor, TraceEnd};

    fn actor() -> Actor {
        Actor::new("u", "u@example.com", "User")
    }

    fn record(id: &str) -> Record {
        Record::new(
            id.parse().unwrap(),
            format!("Record {id}"),
            String::new(),
            Vec::new(),
            actor(),
            Utc::now(),
        )
    }

    fn link_between(from: &Record, to: &Record) -> TraceLink {
        TraceLink {
            id: LinkId::generate(),
            from: TraceEnd {
                uuid: from.uuid(),
                id: from.id(),
            },
            to: TraceEnd {
                uuid: to.uuid(),
                id: to.id(),
            },
            created_at: Utc::now(),
            created_by: actor(),
            system_generated: false,
        }
    }

    #[test]
    fn next_index_starts_at_one_per_kind() {
        let registry = Registry::new();
        for kind in RecordType::ALL {
            assert_eq!(registry.next_index(kind).get(), 1);
        }
    }

    #[test]
    fn next_index_is_scoped_to_the_kind() {
        let mut registry = Registry::new();
        registry.insert_record(record("UR-1"));
        registry.insert_record(record("UR-2"));
        registry.insert_record(record("SR-5"));

        assert_eq!(registry.next_index(RecordType::UserRequirement).get(), 3);
        assert_eq!(registry.next_index(RecordType::SystemRequirement).get(), 6);
        assert_eq!(registry.next_index(RecordType::TestCase).get(), 1);
    }

    #[test]
    fn lookup_by_id_and_uuid_agree() {
        let mut registry = Registry::new();
        let r = record("TC-1");
        let uuid = r.uuid();
        registry.insert_record(r);

        assert_eq!(registry.uuid_of("TC-1".parse().unwrap()), Some(uuid));
        assert_eq!(
            registry.record_by_id("TC-1".parse().unwrap()).unwrap().uuid(),
            uuid
        );
        assert!(registry.record_by_id("TC-2".parse().unwrap()).is_none());
    }

    #[test]
    #[should_panic(expected = "Duplicate record id")]
    fn duplicate_id_panics() {
        let mut registry = Registry::new();
        registry.insert_record(record("UR-1"));
        registry.insert_record(record("UR-1"));
    }

    #[test]
    fn iteration_is_in_id_order() {
        let mut registry = Registry::new();
        registry.insert_record(record("SR-2"));
        registry.insert_record(record("UR-3"));
        registry.insert_record(record("SR-1"));

        let ids: Vec<String> = registry
            .iter_records()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, ["UR-3", "SR-1", "SR-2"]);
    }

    #[test]
    fn link_roundtrip_through_graph() {
        let mut registry = Registry::new();
        let ur = record("UR-1");
        let sr = record("SR-1");
        let link = link_between(&ur, &sr);
        let link_id = link.id();
        let (ur_uuid, sr_uuid) = (ur.uuid(), sr.uuid());

        registry.insert_record(ur);
        registry.insert_record(sr);
        registry.insert_link(link);

        assert!(registry.edge_between(ur_uuid, sr_uuid).is_some());
        assert_eq!(registry.links_from(ur_uuid).count(), 1);
        assert_eq!(registry.links_to(sr_uuid).count(), 1);
        assert_eq!(registry.links_to(ur_uuid).count(), 0);

        let removed = registry.remove_link(link_id).unwrap();
        assert_eq!(removed.id(), link_id);
        assert!(registry.edge_between(ur_uuid, sr_uuid).is_none());
        assert!(registry.remove_link(link_id).is_none());
    }
}
