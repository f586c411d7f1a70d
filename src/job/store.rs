//! Process-wide job store.
//!
//! ## Why a concurrent map with closure-based updates?
//!
//! The store is shared by every request-handling worker and every runner
//! task. Readers take consistent snapshots; the single writer (the job's
//! own runner) merges fields through [`JobStore::update`], which runs the
//! caller's closure while holding the entry's shard lock. That gives the
//! atomic get/update-per-key contract a preemptively-threaded runtime
//! needs — a plain map with unsynchronized mutation would tear under
//! concurrent polling.
//!
//! There is no eviction and no persistence: records live for the process
//! lifetime, so memory grows with total submissions (a deliberate
//! retention choice, see DESIGN.md).

use crate::job::record::{JobId, JobRecord};
use dashmap::DashMap;

/// Mapping from job identifier to mutable job record.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<JobId, JobRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Insert a freshly created record.
    ///
    /// Identifiers are UUIDs, so an existing entry under the same id would
    /// indicate a logic error; the old record is replaced regardless.
    pub fn create(&self, record: JobRecord) {
        self.jobs.insert(record.id.clone(), record);
    }

    /// Snapshot a record by id.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.get(id).map(|r| r.value().clone())
    }

    /// Mutate a record in place under its entry lock.
    ///
    /// Returns `false` when the id is unknown.
    pub fn update<F>(&self, id: &JobId, mutate: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        match self.jobs.get_mut(id) {
            Some(mut record) => {
                mutate(record.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::record::JobStatus;
    use std::path::PathBuf;

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), PathBuf::from("/tmp/in.pdf"), None)
    }

    #[test]
    fn create_then_get_returns_snapshot() {
        let store = JobStore::new();
        let rec = record();
        let id = rec.id.clone();
        store.create(rec);

        let snap = store.get(&id).expect("record exists");
        assert_eq!(snap.status, JobStatus::Queued);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = JobStore::new();
        assert!(store.get(&JobId::from("nope")).is_none());
    }

    #[test]
    fn update_mutates_under_entry_lock() {
        let store = JobStore::new();
        let rec = record();
        let id = rec.id.clone();
        store.create(rec);

        let updated = store.update(&id, |r| {
            r.status = JobStatus::Analyzing;
            r.progress = 5;
        });
        assert!(updated);

        let snap = store.get(&id).unwrap();
        assert_eq!(snap.status, JobStatus::Analyzing);
        assert_eq!(snap.progress, 5);
    }

    #[test]
    fn update_unknown_id_returns_false() {
        let store = JobStore::new();
        assert!(!store.update(&JobId::from("nope"), |_| unreachable!()));
    }

    #[test]
    fn snapshots_do_not_alias_the_stored_record() {
        let store = JobStore::new();
        let rec = record();
        let id = rec.id.clone();
        store.create(rec);

        let mut snap = store.get(&id).unwrap();
        snap.progress = 99;

        assert_eq!(store.get(&id).unwrap().progress, 0);
    }
}
