//! Market registry: id allocation and append-only record storage

use std::collections::{BTreeMap, HashMap};

use crate::error::{MarketError, MarketResult};
use crate::models::{CompositeTopic, MarketKey, Topic};

/// A record the registry can index.
pub trait Record {
    fn id(&self) -> u64;
    fn creator(&self) -> &str;
    /// Key of the record with the given id in this record's numbering space
    fn key_for(id: u64) -> MarketKey;
}

impl Record for Topic {
    fn id(&self) -> u64 {
        self.id
    }

    fn creator(&self) -> &str {
        &self.creator
    }

    fn key_for(id: u64) -> MarketKey {
        MarketKey::Simple(id)
    }
}

impl Record for CompositeTopic {
    fn id(&self) -> u64 {
        self.id
    }

    fn creator(&self) -> &str {
        &self.creator
    }

    fn key_for(id: u64) -> MarketKey {
        MarketKey::Composite(id)
    }
}

/// Append-only store of one market kind. Ids start at 1 and never repeat.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    next_id: u64,
    records: BTreeMap<u64, T>,
    by_creator: HashMap<String, Vec<u64>>,
}

impl<T: Record> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Registry<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
            by_creator: HashMap::new(),
        }
    }

    /// Rebuild from persisted records (any order).
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.next_id = registry.next_id.max(record.id() + 1);
            registry.insert(record);
        }
        registry
    }

    /// Reserve the next id. Call only once the record is certain to be inserted.
    pub fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn insert(&mut self, record: T) {
        let id = record.id();
        debug_assert!(!self.records.contains_key(&id), "registry ids are never reused");
        self.by_creator
            .entry(record.creator().to_string())
            .or_default()
            .push(id);
        self.records.insert(id, record);
    }

    pub fn get(&self, id: u64) -> MarketResult<&T> {
        self.records
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(T::key_for(id)))
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> MarketResult<&mut T> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(T::key_for(id)))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in id (= insertion) order.
    pub fn list_all(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }

    pub fn list_by_creator(&self, creator: &str) -> Vec<&T> {
        self.by_creator
            .get(creator)
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id)).collect())
            .unwrap_or_default()
    }

    /// Undo every allocation at or after `next_id`. Only used to unwind a
    /// command whose durable write failed.
    pub(crate) fn rollback_to(&mut self, next_id: u64) {
        let removed = self.records.split_off(&next_id);
        for record in removed.values() {
            if let Some(ids) = self.by_creator.get_mut(record.creator()) {
                ids.retain(|id| *id < next_id);
            }
        }
        self.next_id = next_id;
    }

    /// Restore a single record to an earlier copy.
    pub(crate) fn replace(&mut self, record: T) {
        self.records.insert(record.id(), record);
    }
}
