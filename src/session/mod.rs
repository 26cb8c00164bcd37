use crate::api::{AuthStatus, DeskApi};
use crate::dashboard::DashboardError;
use crate::shared::ClientLog;
use std::path::PathBuf;
use std::time::Duration;

pub mod store;

pub use store::{clear_session, load_session, save_session, SessionError, SessionRecord};

const ACTIVITY_PERSIST_INTERVAL_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheck {
    pub status: AuthStatus,
    /// Non-blocking note shown when the check itself could not complete.
    pub diagnostic: Option<String>,
}

/// Owns the agent identity: login, logout, restore from disk and the
/// inactivity timeout.
#[derive(Debug, Clone)]
pub struct SessionGate {
    store_path: Option<PathBuf>,
    inactivity_timeout_secs: i64,
    agent_id: Option<String>,
    session_token: Option<String>,
    last_activity: i64,
    persisted_activity: i64,
    log: ClientLog,
}

impl SessionGate {
    pub fn new(store_path: Option<PathBuf>, inactivity_timeout: Duration, log: ClientLog) -> Self {
        Self {
            store_path,
            inactivity_timeout_secs: i64::try_from(inactivity_timeout.as_secs()).unwrap_or(i64::MAX),
            agent_id: None,
            session_token: None,
            last_activity: 0,
            persisted_activity: 0,
            log,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity
    }

    /// Loads the persisted identity, if any and not idle for too long. The
    /// caller still re-validates it with `check_auth_status`.
    pub fn restore<A: DeskApi + ?Sized>(&mut self, api: &mut A, now: i64) -> Option<String> {
        let path = self.store_path.clone()?;
        let record = match load_session(&path) {
            Ok(record) => record?,
            Err(err) => {
                self.log.warn("session.restore_failed", &err.to_string());
                self.discard_record();
                return None;
            }
        };
        if now.saturating_sub(record.last_activity) > self.inactivity_timeout_secs {
            self.log.info(
                "session.expired",
                &format!("persisted session for {} timed out", record.agent_id),
            );
            self.discard_record();
            return None;
        }
        api.restore_session_token(record.session_token.as_deref());
        self.agent_id = Some(record.agent_id.clone());
        self.session_token = record.session_token;
        self.last_activity = record.last_activity;
        self.persisted_activity = record.last_activity;
        Some(record.agent_id)
    }

    /// Network failures fail closed: the agent is treated as signed out, but
    /// the persisted record is kept so the next check can succeed.
    pub fn check_auth_status<A: DeskApi + ?Sized>(&mut self, api: &mut A, now: i64) -> AuthCheck {
        match api.check_auth() {
            Ok(AuthStatus::Authenticated { agent_id }) => {
                self.establish(api, agent_id.clone(), now);
                AuthCheck {
                    status: AuthStatus::Authenticated { agent_id },
                    diagnostic: None,
                }
            }
            Ok(AuthStatus::Unauthenticated) => {
                if self.agent_id.is_some() {
                    self.log.info("auth.session_invalid", "server no longer accepts the session");
                }
                self.forget(api);
                AuthCheck {
                    status: AuthStatus::Unauthenticated,
                    diagnostic: None,
                }
            }
            Err(err) => {
                self.log.warn("auth.check_failed", &err.to_string());
                self.agent_id = None;
                AuthCheck {
                    status: AuthStatus::Unauthenticated,
                    diagnostic: Some(format!("Could not verify session: {}", err.user_message())),
                }
            }
        }
    }

    pub fn login<A: DeskApi + ?Sized>(
        &mut self,
        api: &mut A,
        username: &str,
        password: &str,
        now: i64,
    ) -> Result<String, DashboardError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(DashboardError::MissingCredentials);
        }
        let agent_id = api.login(username, password).map_err(|err| {
            self.log.warn("auth.login_failed", &err.to_string());
            DashboardError::Api(err)
        })?;
        self.establish(api, agent_id.clone(), now);
        self.log.info("auth.login", &format!("signed in as {agent_id}"));
        Ok(agent_id)
    }

    /// Local state is cleared even when the server call fails.
    pub fn logout<A: DeskApi + ?Sized>(&mut self, api: &mut A) -> Result<(), DashboardError> {
        let result = api.logout();
        if let Err(err) = &result {
            self.log.warn("auth.logout_failed", &err.to_string());
        }
        self.forget(api);
        self.log.info("auth.logout", "signed out");
        result.map_err(DashboardError::Api)
    }

    pub fn touch<A: DeskApi + ?Sized>(&mut self, api: &A, now: i64) {
        if self.agent_id.is_none() {
            return;
        }
        self.last_activity = now;
        let token = api.session_token();
        let token_changed = token != self.session_token;
        self.session_token = token;
        if token_changed
            || now.saturating_sub(self.persisted_activity) >= ACTIVITY_PERSIST_INTERVAL_SECS
        {
            self.persist();
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.agent_id.is_some()
            && now.saturating_sub(self.last_activity) > self.inactivity_timeout_secs
    }

    /// Ends an idle session. The server logout is best effort.
    pub fn expire<A: DeskApi + ?Sized>(&mut self, api: &mut A) {
        if let Some(agent_id) = self.agent_id.as_deref() {
            self.log.info(
                "session.expired",
                &format!("{agent_id} signed out after inactivity"),
            );
        }
        if let Err(err) = api.logout() {
            self.log.warn("auth.logout_failed", &err.to_string());
        }
        self.forget(api);
    }

    fn establish<A: DeskApi + ?Sized>(&mut self, api: &A, agent_id: String, now: i64) {
        self.agent_id = Some(agent_id);
        self.session_token = api.session_token();
        self.last_activity = now;
        self.persist();
    }

    fn forget<A: DeskApi + ?Sized>(&mut self, api: &mut A) {
        self.agent_id = None;
        self.session_token = None;
        api.restore_session_token(None);
        self.discard_record();
    }

    fn persist(&mut self) {
        let (Some(path), Some(agent_id)) = (self.store_path.as_ref(), self.agent_id.as_ref()) else {
            return;
        };
        let record = SessionRecord {
            agent_id: agent_id.clone(),
            session_token: self.session_token.clone(),
            last_activity: self.last_activity,
        };
        match save_session(path, &record) {
            Ok(()) => self.persisted_activity = self.last_activity,
            Err(err) => self.log.warn("session.persist_failed", &err.to_string()),
        }
    }

    fn discard_record(&self) {
        if let Some(path) = &self.store_path {
            if let Err(err) = clear_session(path) {
                self.log.warn("session.clear_failed", &err.to_string());
            }
        }
    }
}
