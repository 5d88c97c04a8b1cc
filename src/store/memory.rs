//! In-memory store
//!
//! HashMap-backed implementation of `Store`.

use std::collections::{HashMap, HashSet};

use super::Store;
use crate::record::Record;

/// Records held in a plain HashMap keyed by name
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut store = Self::new();
        for record in iter {
            store.add_or_replace(record);
        }
        store
    }
}

impl Store for MemoryStore {
    fn add_or_replace(&mut self, record: Record) {
        self.records.insert(record.name.clone(), record);
    }

    fn get_by_name(&self, name: &str) -> Option<Record> {
        self.records.get(name).cloned()
    }

    fn delete_by_name(&mut self, name: &str) {
        self.records.remove(name);
    }

    fn count(&self) -> usize {
        self.records.len()
    }

    fn names(&self) -> HashSet<String> {
        self.records.keys().cloned().collect()
    }
}
