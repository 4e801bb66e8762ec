use std::time::{Duration, Instant};

/// Trailing-edge debounce for push payloads.
///
/// Every offer restarts the window; only the newest payload survives.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    pending: Option<(String, Instant)>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn offer(&mut self, payload: String, now: Instant) {
        self.pending = Some((payload, now + self.window));
    }

    /// When the pending payload becomes ready.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    pub fn take_ready(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, at)) if *at <= now => self.pending.take().map(|(payload, _)| payload),
            _ => None,
        }
    }
}
