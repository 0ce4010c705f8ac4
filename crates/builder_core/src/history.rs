use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(500);

struct PendingEdit<T, K> {
    key: K,
    snapshot: T,
    deadline: Instant,
}

pub struct History<T, K = ()> {
    entries: VecDeque<T>,
    cursor: Option<usize>,
    capacity: usize,
    window: Duration,
    pending: Option<PendingEdit<T, K>>,
}

impl<T: Clone, K: PartialEq> Default for History<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, K: PartialEq> History<T, K> {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_COALESCE_WINDOW)
    }

    pub fn with_limits(capacity: usize, window: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            capacity: capacity.max(1),
            window,
            pending: None,
        }
    }

    pub fn record(&mut self, snapshot: T) {
        self.flush_pending();
        self.push(snapshot);
    }

    pub fn record_coalesced(&mut self, key: K, snapshot: T, now: Instant) {
        self.flush_due(now);
        let deadline = now + self.window;
        if let Some(pending) = self.pending.as_mut() {
            if pending.key == key {
                pending.snapshot = snapshot;
                pending.deadline = deadline;
                return;
            }
        }
        self.flush_pending();
        self.pending = Some(PendingEdit {
            key,
            snapshot,
            deadline,
        });
    }

    pub fn flush_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.push(pending.snapshot);
                true
            }
            None => false,
        }
    }

    pub fn flush_due(&mut self, now: Instant) -> bool {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.deadline <= now)
        {
            return self.flush_pending();
        }
        false
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    pub fn undo(&mut self) -> Option<T> {
        self.flush_pending();
        let cursor = self.cursor.filter(|cursor| *cursor > 0)?;
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1).cloned()
    }

    pub fn redo(&mut self) -> Option<T> {
        if self.pending.is_some() {
            return None;
        }
        let next = self.cursor.map_or(0, |cursor| cursor + 1);
        if next >= self.entries.len() {
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next).cloned()
    }

    pub fn can_undo(&self) -> bool {
        match self.cursor {
            Some(cursor) => cursor > 0 || self.pending.is_some(),
            None => false,
        }
    }

    /// A pending edit would truncate the redo branch once committed.
    pub fn can_redo(&self) -> bool {
        self.pending.is_none()
            && self
                .cursor
                .map_or(!self.entries.is_empty(), |cursor| cursor + 1 < self.entries.len())
    }

    pub fn current(&self) -> Option<&T> {
        self.cursor.and_then(|cursor| self.entries.get(cursor))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.pending = None;
    }

    fn push(&mut self, snapshot: T) {
        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        self.entries.truncate(keep);
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
