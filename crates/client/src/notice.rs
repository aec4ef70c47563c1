//! Dismissible user-facing notices

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub message: String,
}

#[derive(Debug, Default)]
struct NoticeList {
    next_id: u64,
    entries: Vec<Notice>,
}

/// Shared list of notices, oldest first
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    inner: Arc<Mutex<NoticeList>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NoticeList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, message: impl Into<String>) -> u64 {
        let mut list = self.lock();
        list.next_id += 1;
        let id = list.next_id;
        list.entries.push(Notice {
            id,
            message: message.into(),
        });
        id
    }

    pub fn list(&self) -> Vec<Notice> {
        self.lock().entries.clone()
    }

    /// Remove a notice; returns false if it was already gone
    pub fn dismiss(&self, id: u64) -> bool {
        let mut list = self.lock();
        let before = list.entries.len();
        list.entries.retain(|n| n.id != id);
        list.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
