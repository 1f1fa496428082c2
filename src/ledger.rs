/* Append-only record of every attempted modification, with grouped views
   for reporting. */

use crate::types::ModificationRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Ordered log of modification attempts. Entries are only ever appended,
/// in the order the attempts happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<ModificationRecord>,
}

/// Attempt counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub attempted: usize,
    pub applied: usize,
    pub skipped: usize,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger { entries: vec![] }
    }

    pub fn append(&mut self, record: ModificationRecord) {
        self.entries.push(record);
    }

    pub fn append_batch(&mut self, records: Vec<ModificationRecord>) {
        self.entries.extend(records);
    }

    pub fn entries(&self) -> &[ModificationRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn applied_count(&self) -> usize {
        self.entries.iter().filter(|e| e.applied).count()
    }

    /// Entries grouped by the file they touched, each group in append order.
    pub fn per_file(&self) -> BTreeMap<PathBuf, Vec<&ModificationRecord>> {
        let mut groups: BTreeMap<PathBuf, Vec<&ModificationRecord>> = BTreeMap::new();
        for entry in &self.entries {
            groups.entry(entry.file.clone()).or_default().push(entry);
        }
        groups
    }

    /// Attempt counts grouped by category.
    pub fn by_category(&self) -> BTreeMap<String, CategoryCount> {
        let mut counts: BTreeMap<String, CategoryCount> = BTreeMap::new();
        for entry in &self.entries {
            let count = counts.entry(entry.category.clone()).or_default();
            count.attempted += 1;
            if entry.applied {
                count.applied += 1;
            } else {
                count.skipped += 1;
            }
        }
        counts
    }
}

/// A [Ledger] shared between worker threads. Batches from one file land
/// contiguously, so per-file ordering survives parallel runs.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<parking_lot::Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new() -> SharedLedger {
        SharedLedger { inner: Arc::new(parking_lot::Mutex::new(Ledger::new())) }
    }

    pub fn append_batch(&self, records: Vec<ModificationRecord>) {
        self.inner.lock().append_batch(records);
    }

    pub fn snapshot(&self) -> Ledger {
        self.inner.lock().clone()
    }

    /// Recovers the ledger once all workers are done. Clones if another
    /// handle is still alive.
    pub fn into_ledger(self) -> Ledger {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}
