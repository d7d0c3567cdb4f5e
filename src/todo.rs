//! Todo store (C7): an in-memory task list shared across a turn, guarded by
//! an `RwLock` with copy-in/copy-out semantics.
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub active_form: String,
    pub status: TodoStatus,
}

/// Thread-safe todo list. At most one item may be `InProgress` at a time;
/// violating writes are rejected rather than silently corrected.
#[derive(Default)]
pub struct TodoStore {
    items: RwLock<Vec<TodoItem>>,
}

#[derive(Debug)]
pub struct InvariantViolation(pub String);

/// Counts of todo items by status, as returned by [`TodoStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TodoStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TodoStore {
    pub fn new() -> Self {
        TodoStore { items: RwLock::new(Vec::new()) }
    }

    pub fn snapshot(&self) -> Vec<TodoItem> {
        self.items.read().unwrap().clone()
    }

    /// Replace the whole list, rejecting the write if more than one item
    /// would be `InProgress`.
    pub fn replace(&self, new_items: Vec<TodoItem>) -> Result<(), InvariantViolation> {
        let in_progress = new_items.iter().filter(|i| i.status == TodoStatus::InProgress).count();
        if in_progress > 1 {
            return Err(InvariantViolation(format!(
                "at most one todo item may be in_progress, got {in_progress}"
            )));
        }
        *self.items.write().unwrap() = new_items;
        Ok(())
    }

    /// The item currently `InProgress`, if any.
    pub fn in_progress(&self) -> Option<TodoItem> {
        self.items.read().unwrap().iter().find(|i| i.status == TodoStatus::InProgress).cloned()
    }

    /// Counts of items by status.
    pub fn stats(&self) -> TodoStats {
        let items = self.items.read().unwrap();
        let mut stats = TodoStats::default();
        for item in items.iter() {
            match item.status {
                TodoStatus::Pending => stats.pending += 1,
                TodoStatus::InProgress => stats.in_progress += 1,
                TodoStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }
}
