use shared::protocol::FormSummary;
use tokio::time::{Duration, Instant};

pub const DEFAULT_FORM_LIST_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FormListCache {
    ttl: Duration,
    entry: Option<(Instant, Vec<FormSummary>)>,
}

impl Default for FormListCache {
    fn default() -> Self {
        Self::new(DEFAULT_FORM_LIST_TTL)
    }
}

impl FormListCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn get(&self, now: Instant) -> Option<&[FormSummary]> {
        self.entry
            .as_ref()
            .filter(|(fetched_at, _)| now.saturating_duration_since(*fetched_at) < self.ttl)
            .map(|(_, forms)| forms.as_slice())
    }

    pub fn put(&mut self, now: Instant, forms: Vec<FormSummary>) {
        self.entry = Some((now, forms));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
