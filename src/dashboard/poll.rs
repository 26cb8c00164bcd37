use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Poll,
    Push,
}

/// Decides when the conversation list is fetched: on a fixed interval and
/// after push events, with pushes debounced and at most one fetch in flight.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    debounce: Duration,
    last_fetch: Option<Instant>,
    pending_since: Option<Instant>,
    in_flight: bool,
}

impl RefreshScheduler {
    pub fn new(interval: Duration, debounce: Duration) -> Self {
        Self {
            interval,
            debounce,
            last_fetch: None,
            pending_since: None,
            in_flight: false,
        }
    }

    /// Records a push-triggered refresh request. Bursts collapse into one.
    pub fn request(&mut self, now: Instant) {
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Marks a fetch done outside the scheduler (initial load, user action)
    /// so the next poll waits a full interval.
    pub fn record_fetch(&mut self, now: Instant) {
        self.last_fetch = Some(now);
        self.pending_since = None;
    }

    pub fn take_due(&mut self, now: Instant) -> Option<RefreshReason> {
        if self.in_flight {
            return None;
        }
        let reason = if self
            .pending_since
            .is_some_and(|since| now.duration_since(since) >= self.debounce)
        {
            RefreshReason::Push
        } else if self
            .last_fetch
            .map(|last| now.duration_since(last) >= self.interval)
            .unwrap_or(true)
        {
            RefreshReason::Poll
        } else {
            return None;
        };
        self.in_flight = true;
        self.pending_since = None;
        Some(reason)
    }

    pub fn finish(&mut self, now: Instant) {
        self.in_flight = false;
        self.last_fetch = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_fetch = None;
        self.pending_since = None;
        self.in_flight = false;
    }
}
