use std::collections::BTreeMap;
use std::sync::RwLock;

use super::types::{Store, StoreError, StoreResult};

/// Records held in process memory, lost on restart.
#[derive(Debug)]
pub struct MemoryStore<T> {
    db: RwLock<BTreeMap<String, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        MemoryStore {
            db: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Store<T> for MemoryStore<T> {
    fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let mut db = self.db.write().map_err(|_| StoreError::Poisoned)?;
        db.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<T> {
        let db = self.db.read().map_err(|_| StoreError::Poisoned)?;
        db.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list(&self) -> StoreResult<Vec<T>> {
        let db = self.db.read().map_err(|_| StoreError::Poisoned)?;
        Ok(db.values().cloned().collect())
    }

    fn count(&self) -> StoreResult<usize> {
        let db = self.db.read().map_err(|_| StoreError::Poisoned)?;
        Ok(db.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{State, Task};

    #[test]
    fn put_then_get_returns_equal_task() {
        let store = MemoryStore::new();
        let mut task = Task::new("web", "nginx:latest");
        task.state = State::Running;
        task.memory = 1024;
        task.container_id = Some("c0ffee".into());

        store.put(&task.id.to_string(), &task).unwrap();
        assert_eq!(store.get(&task.id.to_string()).unwrap(), task);
    }

    #[test]
    fn put_overwrites_and_count_tracks_keys() {
        let store = MemoryStore::new();
        let mut task = Task::new("web", "nginx:latest");
        let key = task.id.to_string();
        store.put(&key, &task).unwrap();
        task.state = State::Scheduled;
        store.put(&key, &task).unwrap();
        store.put("other", &Task::new("db", "postgres")).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get(&key).unwrap().state, State::Scheduled);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn missing_key_is_not_found() {
        let store: MemoryStore<Task> = MemoryStore::new();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
    }
}
