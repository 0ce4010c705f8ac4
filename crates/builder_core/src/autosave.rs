use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_SAVED_DISPLAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Identifies one save attempt; completions for stale tickets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTicket(u64);

#[derive(Debug, Clone)]
pub struct AutosaveCoordinator {
    debounce: Duration,
    saved_display: Duration,
    retry_delay: Duration,
    dirty: bool,
    state: SaveState,
    deadline: Option<Instant>,
    saved_until: Option<Instant>,
    in_flight: Option<SaveTicket>,
    edited_during_flight: bool,
    next_ticket: u64,
}

impl Default for AutosaveCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_SAVED_DISPLAY, DEFAULT_RETRY_DELAY)
    }
}

impl AutosaveCoordinator {
    pub fn new(debounce: Duration, saved_display: Duration, retry_delay: Duration) -> Self {
        Self {
            debounce,
            saved_display,
            retry_delay,
            dirty: false,
            state: SaveState::Idle,
            deadline: None,
            saved_until: None,
            in_flight: None,
            edited_during_flight: false,
            next_ticket: 0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        self.deadline = Some(now + self.debounce);
        if self.in_flight.is_some() {
            self.edited_during_flight = true;
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.dirty
            && self.in_flight.is_none()
            && self.deadline.is_some_and(|deadline| deadline <= now)
    }

    pub fn begin(&mut self) -> Option<SaveTicket> {
        if !self.dirty || self.in_flight.is_some() {
            return None;
        }
        let ticket = SaveTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.edited_during_flight = false;
        self.deadline = None;
        self.saved_until = None;
        self.state = SaveState::Saving;
        Some(ticket)
    }

    pub fn defer(&mut self) {
        self.deadline = None;
    }

    pub fn complete(&mut self, ticket: SaveTicket, succeeded: bool, now: Instant) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.in_flight = None;
        if succeeded {
            if !self.edited_during_flight {
                self.dirty = false;
                self.deadline = None;
            }
            self.state = SaveState::Saved;
            self.saved_until = Some(now + self.saved_display);
        } else {
            self.state = SaveState::Error;
            if !self.edited_during_flight {
                self.deadline = Some(now + self.retry_delay);
            }
        }
        self.edited_during_flight = false;
        true
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if self.state == SaveState::Saved && self.saved_until.is_some_and(|until| until <= now) {
            self.state = SaveState::Idle;
            self.saved_until = None;
            return true;
        }
        false
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let save = self
            .deadline
            .filter(|_| self.dirty && self.in_flight.is_none());
        let display = self.saved_until.filter(|_| self.state == SaveState::Saved);
        match (save, display) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn reset(&mut self) {
        let next_ticket = self.next_ticket;
        *self = Self::new(self.debounce, self.saved_display, self.retry_delay);
        self.next_ticket = next_ticket;
    }
}

#[cfg(test)]
#[path = "tests/autosave_tests.rs"]
mod tests;
