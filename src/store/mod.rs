//! Store Module
//!
//! The record store consumed by the server.
//!
//! ## Responsibilities
//! - `Store` is the seam to whatever engine actually holds the records
//! - `MemoryStore` is the in-process implementation shipped with the server
//! - `SharedStore` owns the single lock every connection goes through
//!
//! ## Locking
//! Implementations are not assumed to be thread-safe. All access goes through
//! `SharedStore::lock`, and a reader keeps the guard until its response has
//! been written, so no writer can slip in between the read and the send.

mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::record::Record;

pub use memory::MemoryStore;

/// Keyed collection of records, addressed by record name
pub trait Store: Send + 'static {
    /// Insert a record, replacing any record with the same name
    fn add_or_replace(&mut self, record: Record);

    /// Fetch a record by name
    fn get_by_name(&self, name: &str) -> Option<Record>;

    /// Remove a record by name. Removing an absent name is a no-op.
    fn delete_by_name(&mut self, name: &str);

    /// Number of distinct names stored
    fn count(&self) -> usize;

    /// All stored names, in no particular order
    fn names(&self) -> HashSet<String>;
}

/// A store shared by every connection worker behind one mutex
pub struct SharedStore<S: Store> {
    inner: Arc<Mutex<S>>,
}

impl<S: Store> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Enter the critical section. Hold the guard across the store call and,
    /// for reads, the write of the response built from it.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }
}

impl<S: Store> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
