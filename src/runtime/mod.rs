use crate::api::{AuthStatus, DeskApi};
use crate::config::Settings;
use crate::dashboard::{DashboardClient, RefreshReason, RefreshScheduler};
use crate::push::PushChannel;
use std::time::{Duration, Instant};

const MAX_EVENTS_PER_TICK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub events_handled: usize,
    pub refreshed: Option<RefreshReason>,
    pub session_expired: bool,
}

/// Single-threaded driver for the dashboard: drains push events, enforces
/// the inactivity timeout and runs the poll/debounce schedule.
pub struct DashboardRuntime<A: DeskApi, P: PushChannel> {
    client: DashboardClient<A, P>,
    scheduler: RefreshScheduler,
}

impl<A: DeskApi, P: PushChannel> DashboardRuntime<A, P> {
    pub fn new(client: DashboardClient<A, P>, poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            client,
            scheduler: RefreshScheduler::new(poll_interval, debounce),
        }
    }

    pub fn from_settings(client: DashboardClient<A, P>, settings: &Settings) -> Self {
        Self::new(client, settings.poll_interval(), settings.refresh_debounce())
    }

    pub fn client(&self) -> &DashboardClient<A, P> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut DashboardClient<A, P> {
        &mut self.client
    }

    pub fn into_client(self) -> DashboardClient<A, P> {
        self.client
    }

    /// Restores the persisted session; a successful restore counts as the
    /// initial list fetch.
    pub fn start(&mut self, now: Instant) -> AuthStatus {
        let status = self.client.restore_session();
        self.note_fetch(now);
        status
    }

    /// Call after a fetch made outside `tick` (login, filter change, handoff).
    pub fn note_fetch(&mut self, now: Instant) {
        if self.client.state().is_signed_in() {
            self.scheduler.record_fetch(now);
        } else {
            self.scheduler.reset();
        }
    }

    pub fn tick(&mut self, now: Instant, now_secs: i64) -> TickReport {
        let mut report = TickReport::default();

        while report.events_handled < MAX_EVENTS_PER_TICK {
            let Some(event) = self.client.push_mut().poll_event() else {
                break;
            };
            self.client.handle_push_event(event);
            report.events_handled += 1;
        }

        if self.client.enforce_inactivity(now_secs) {
            report.session_expired = true;
            self.scheduler.reset();
        }

        if self.client.take_refresh_request() {
            self.scheduler.request(now);
        }

        if self.client.state().is_signed_in() {
            if let Some(reason) = self.scheduler.take_due(now) {
                self.client.poll_conversations();
                self.scheduler.finish(now);
                report.refreshed = Some(reason);
            }
        }

        self.client.expire_notices(now);
        report
    }
}
