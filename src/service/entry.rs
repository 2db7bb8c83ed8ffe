//! Registry entry for one query.

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::query::{Query, QuerySummary};

/// A registered query plus its single-writer lock.
///
/// `transition` is held for the whole of a mutating operation, including any
/// checkpoint-store call. `record` is only locked briefly to read or commit,
/// so readers never wait behind a slow transition.
pub(crate) struct QueryEntry {
    /// Registration order, used for stable listing.
    pub(crate) seq: u64,
    record: RwLock<Query>,
    transition: Mutex<()>,
}

impl QueryEntry {
    pub(crate) fn new(seq: u64, query: Query) -> Self {
        Self {
            seq,
            record: RwLock::new(query),
            transition: Mutex::new(()),
        }
    }

    pub(crate) async fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().await
    }

    pub(crate) fn snapshot(&self) -> Query {
        self.record.read().clone()
    }

    pub(crate) fn summary(&self) -> QuerySummary {
        self.record.read().summary()
    }

    /// Apply `f` to the record under a short write lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Query) -> R) -> R {
        f(&mut self.record.write())
    }
}
