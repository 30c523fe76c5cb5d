//! Priority queue feeding the worker pool.
//!
//! Items are ordered by `(priority, id)`: smaller priority values run first
//! and equal priorities keep submission order. A removed item leaves the
//! order of the rest untouched.

use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub max_len: usize,
}

// Field order gives the derived ordering: priority first, then id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    priority: i32,
    id: WorkId,
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    next_id: u64,
    items: BTreeMap<Key, T>,
    max_len: Option<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            items: BTreeMap::new(),
            max_len: None,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pushes ignoring the length limit.
    pub fn push(&mut self, priority: i32, payload: T) -> WorkId {
        let id = WorkId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.items.insert(Key { priority, id }, payload);
        id
    }

    pub fn try_push(&mut self, priority: i32, payload: T) -> Result<WorkId, WorkQueueFull> {
        if let Some(max_len) = self.max_len
            && self.items.len() >= max_len
        {
            return Err(WorkQueueFull { max_len });
        }
        Ok(self.push(priority, payload))
    }

    /// Removes a pending item. Returns `true` if it was still queued.
    pub fn cancel(&mut self, id: WorkId) -> bool {
        let key = self.items.keys().find(|k| k.id == id).copied();
        key.is_some_and(|k| self.items.remove(&k).is_some())
    }

    /// Pops the next (lowest priority value, then oldest) item.
    pub fn pop_next(&mut self) -> Option<(WorkId, i32, T)> {
        let (key, payload) = self.items.pop_first()?;
        Some((key.id, key.priority, payload))
    }

    /// Removes every pending item in queue order.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items).into_values().collect()
    }
}
