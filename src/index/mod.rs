//! Join indices: linked entities grouped by owning subject, and the
//! id-addressable record store

use std::collections::HashMap;

use crate::model::{Episode, Record, RelationEdge, StaffAssignment};

/// Entities that belong to exactly one subject
pub trait Owned {
    fn owner(&self) -> u64;
}

impl Owned for RelationEdge {
    fn owner(&self) -> u64 {
        self.source
    }
}

impl Owned for StaffAssignment {
    fn owner(&self) -> u64 {
        self.subject
    }
}

impl Owned for Episode {
    fn owner(&self) -> u64 {
        self.subject
    }
}

/// subject id -> [entities], insertion order preserved per subject
#[derive(Debug, Clone)]
pub struct LinkIndex<T> {
    by_owner: HashMap<u64, Vec<T>>,
    total: usize,
}

impl<T> Default for LinkIndex<T> {
    fn default() -> Self {
        LinkIndex { by_owner: HashMap::new(), total: 0 }
    }
}

impl<T: Owned> LinkIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: T) {
        self.by_owner.entry(item.owner()).or_default().push(item);
        self.total += 1;
    }

    /// Entities of one subject (empty if it has none)
    pub fn of(&self, owner: u64) -> &[T] {
        self.by_owner.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of subjects with at least one entity
    pub fn owners(&self) -> usize {
        self.by_owner.len()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Stable-sort every subject's entities
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&T) -> K) {
        for items in self.by_owner.values_mut() {
            items.sort_by_key(&mut key);
        }
    }
}

impl<T: Owned> FromIterator<T> for LinkIndex<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut index = LinkIndex::new();
        for item in iter {
            index.insert(item);
        }
        index
    }
}

impl LinkIndex<RelationEdge> {
    /// Edges of `source` carrying `code`
    pub fn edges(&self, source: u64, code: u32) -> impl Iterator<Item = &RelationEdge> {
        self.of(source).iter().filter(move |e| e.code == code)
    }
}

impl LinkIndex<StaffAssignment> {
    /// Assignments of `subject` under `position`
    pub fn assignments(&self, subject: u64, position: u32) -> impl Iterator<Item = &StaffAssignment> {
        self.of(subject).iter().filter(move |s| s.position == position)
    }
}

/// The three auxiliary collections. `None` means the collection was not
/// loaded; a query that needs it cannot run.
#[derive(Debug, Clone, Default)]
pub struct Indices {
    pub relations: Option<LinkIndex<RelationEdge>>,
    pub staff: Option<LinkIndex<StaffAssignment>>,
    pub episodes: Option<LinkIndex<Episode>>,
}

impl Indices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relations(mut self, relations: LinkIndex<RelationEdge>) -> Self {
        self.relations = Some(relations);
        self
    }

    pub fn with_staff(mut self, staff: LinkIndex<StaffAssignment>) -> Self {
        self.staff = Some(staff);
        self
    }

    pub fn with_episodes(mut self, episodes: LinkIndex<Episode>) -> Self {
        self.episodes = Some(episodes);
        self
    }
}

/// Id-addressable access to records, needed when conditions look at related
/// subjects
pub trait RecordLookup: Sync {
    fn get(&self, id: u64) -> Option<&Record>;
}

/// Records in input order plus an id -> position map
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    positions: HashMap<u64, usize>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. A later record with a duplicate id replaces the earlier
    /// one in lookups but both stay in iteration order.
    pub fn push(&mut self, record: Record) {
        self.positions.insert(record.id(), self.records.len());
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for RecordStore {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut store = RecordStore::new();
        for record in iter {
            store.push(record);
        }
        store
    }
}

impl RecordLookup for RecordStore {
    fn get(&self, id: u64) -> Option<&Record> {
        self.positions.get(&id).map(|&i| &self.records[i])
    }
}

impl<'a> IntoIterator for &'a RecordStore {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
