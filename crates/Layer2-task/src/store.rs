//! Task Store - the shared map of task records
//!
//! One lock guards the whole map. Mutation happens through synchronous
//! closures, so the lock is never held across an await point.

use crate::task::{TaskId, TaskRecord};
use grove_foundation::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Concurrency-safe mapping from task id to record
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record, returning its id
    ///
    /// Ids are random v4 UUIDs, so an existing entry is only replaced when a
    /// caller inserts the same record twice.
    pub fn insert(&self, record: TaskRecord) -> TaskId {
        let id = record.id;
        self.tasks.lock().insert(id, record);
        id
    }

    /// Snapshot of one record
    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.lock().get(id).cloned()
    }

    /// Snapshot of every record, oldest first
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.tasks.lock().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Run `f` against the record under the lock and refresh `updated_at`
    ///
    /// Returns `None` when the id is unknown (for example after a delete).
    pub fn mutate<R>(&self, id: &TaskId, f: impl FnOnce(&mut TaskRecord) -> R) -> Option<R> {
        let mut tasks = self.tasks.lock();
        let record = tasks.get_mut(id)?;
        let result = f(record);
        record.touch();
        Some(result)
    }

    /// Guarded update: `check` sees the record first and may refuse
    ///
    /// Nothing is modified (not even `updated_at`) unless `check` passes.
    pub fn transition<R>(
        &self,
        id: &TaskId,
        check: impl FnOnce(&TaskRecord) -> Result<()>,
        apply: impl FnOnce(&mut TaskRecord) -> R,
    ) -> Result<R> {
        let mut tasks = self.tasks.lock();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        check(record)?;
        let result = apply(record);
        record.touch();
        Ok(result)
    }

    /// Read a projection of one record without cloning all of it
    pub fn read<R>(&self, id: &TaskId, f: impl FnOnce(&TaskRecord) -> R) -> Option<R> {
        self.tasks.lock().get(id).map(f)
    }

    pub fn remove(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.lock().remove(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskStatus;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_get() {
        let store = TaskStore::new();
        let id = store.insert(TaskRecord::preload("url"));

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(store.contains(&id));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_mutate_unknown_id() {
        let store = TaskStore::new();
        assert!(store.mutate(&TaskId::new(), |r| r.progress = 50).is_none());
    }

    #[test]
    fn test_mutate_refreshes_updated_at() {
        let store = TaskStore::new();
        let id = store.insert(TaskRecord::preload("url"));
        let before = store.get(&id).unwrap().updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let total = store.mutate(&id, |r| {
            r.total_tracks = 4;
            r.total_tracks
        });

        assert_eq!(total, Some(4));
        let after = store.get(&id).unwrap();
        assert!(after.updated_at > before);
        assert_eq!(after.total_tracks, 4);
    }

    #[test]
    fn test_transition_refused_leaves_record_alone() {
        let store = TaskStore::new();
        let id = store.insert(TaskRecord::preload("url"));
        let before = store.get(&id).unwrap();

        let result = store.transition(
            &id,
            |_| Err(Error::InvalidState("nope".to_string())),
            |r| r.progress = 99,
        );

        assert!(matches!(result, Err(Error::InvalidState(_))));
        let after = store.get(&id).unwrap();
        assert_eq!(after.progress, 0);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[test]
    fn test_transition_unknown_id() {
        let store = TaskStore::new();
        let result = store.transition(&TaskId::new(), |_| Ok(()), |_| ());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_ordered_by_creation() {
        let store = TaskStore::new();
        let first = store.insert(TaskRecord::preload("a"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.insert(TaskRecord::preload("b"));

        let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_remove() {
        let store = TaskStore::new();
        let id = store.insert(TaskRecord::preload("url"));

        assert!(store.remove(&id).is_some());
        assert!(store.remove(&id).is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_concurrent_mutations_are_not_lost() {
        let store = Arc::new(TaskStore::new());
        let id = store.insert(TaskRecord::preload("url"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.mutate(&id, |r| r.completed_tracks += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&id).unwrap().completed_tracks, 800);
    }
}
