use crate::api::{AuthStatus, Channel, HttpDeskApi};
use crate::config::{self, ConfigError, Settings, StatePaths};
use crate::dashboard::{ConversationFilter, DashboardClient, DashboardError, DashboardOptions};
use crate::push::{OfflinePush, PushSink, SocketIoChannel, SocketOptions};
use crate::session::{load_session, SessionGate};
use crate::shared::{ClientLog, ConversationId};

pub type CliClient<P = OfflinePush> = DashboardClient<HttpDeskApi, P>;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn map_dashboard_err(err: DashboardError) -> String {
    err.user_message()
}

pub fn load_settings() -> Result<Settings, String> {
    config::load_settings().map_err(map_config_err)
}

pub fn ensure_state_root() -> Result<StatePaths, String> {
    config::load_state_paths().map_err(map_config_err)
}

/// Everything a command needs to talk to the desk backend.
pub struct CommandContext {
    pub settings: Settings,
    pub paths: StatePaths,
    pub log: ClientLog,
}

impl CommandContext {
    pub fn load() -> Result<Self, String> {
        let settings = load_settings()?;
        let paths = ensure_state_root()?;
        let log = ClientLog::new(&paths.root);
        Ok(Self {
            settings,
            paths,
            log,
        })
    }

    pub fn client<P: PushSink>(&self, push: P) -> Result<CliClient<P>, String> {
        let api = HttpDeskApi::new(self.settings.api_base());
        let session = SessionGate::new(
            Some(self.paths.session_path()),
            self.settings.inactivity_timeout(),
            self.log.clone(),
        );
        let options = DashboardOptions::from_settings(&self.settings).map_err(map_config_err)?;
        Ok(DashboardClient::new(
            api,
            push,
            session,
            options,
            self.log.clone(),
        ))
    }

    /// Client for a one-shot command; fails unless the stored session is
    /// still accepted by the server.
    pub fn signed_in_client(&self) -> Result<CliClient, String> {
        let mut client = self.client(OfflinePush)?;
        match client.restore_session() {
            AuthStatus::Authenticated { .. } => Ok(client),
            AuthStatus::Unauthenticated => Err(not_signed_in_message(&client)),
        }
    }

    /// Starts the push channel with whatever session cookie was stored at
    /// startup.
    pub fn push_channel(&self) -> SocketIoChannel {
        let session_cookie = load_session(&self.paths.session_path())
            .ok()
            .flatten()
            .and_then(|record| record.session_token);
        SocketIoChannel::start(SocketOptions {
            push_url: self.settings.resolved_push_url(),
            session_cookie,
            reconnect_backoff: self.settings.reconnect_backoff(),
            log: self.log.clone(),
        })
    }
}

fn not_signed_in_message<P: PushSink>(client: &CliClient<P>) -> String {
    let mut message = "not signed in; run `frontdesk login <username> <password>`".to_string();
    if let Some(notice) = client.state().notices().all().last() {
        message.push_str(&format!(" ({})", notice.text));
    }
    message
}

pub fn parse_conversation_id(raw: Option<&String>, usage: &str) -> Result<ConversationId, String> {
    let raw = raw.ok_or_else(|| format!("usage: {usage}"))?;
    ConversationId::parse(raw).map_err(|e| format!("invalid conversation id `{raw}`: {e}"))
}

/// Parses `--filter <bucket>` and `--channel <name>`. Unknown values fall
/// back to the unfiltered view, matching the dashboard's lenient parsing.
pub fn parse_filter_flags(args: &[String], usage: &str) -> Result<ConversationFilter, String> {
    let mut assignment = None;
    let mut channel = None;
    let mut index = 0;
    while index < args.len() {
        let flag = args[index].as_str();
        let value = args
            .get(index + 1)
            .map(String::as_str)
            .ok_or_else(|| format!("usage: {usage}"))?;
        match flag {
            "--filter" => assignment = Some(value),
            "--channel" => channel = Some(value),
            other => return Err(format!("unknown option `{other}`; usage: {usage}")),
        }
        index += 2;
    }
    Ok(ConversationFilter::parse_lenient(assignment, channel))
}

pub fn filter_label(filter: &ConversationFilter) -> String {
    let channel = filter
        .channel
        .as_ref()
        .map(Channel::as_str)
        .unwrap_or("all");
    format!("filter={}\nchannel={channel}", filter.assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::AssignmentFilter;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn filter_flags_parse_in_any_order() {
        let filter = parse_filter_flags(&args(&["--channel", "instagram", "--filter", "yours"]), "x")
            .expect("flags");
        assert_eq!(filter.assignment, AssignmentFilter::Yours);
        assert_eq!(filter.channel, Some(Channel::Instagram));
    }

    #[test]
    fn filter_flags_reject_dangling_or_unknown_options() {
        assert!(parse_filter_flags(&args(&["--filter"]), "x").is_err());
        let err = parse_filter_flags(&args(&["--sort", "new"]), "x").expect_err("unknown");
        assert!(err.contains("--sort"));
    }

    #[test]
    fn unknown_filter_values_show_everything() {
        let filter =
            parse_filter_flags(&args(&["--filter", "everyone", "--channel", "fax"]), "x").expect("flags");
        assert_eq!(filter, ConversationFilter::default());
    }

    #[test]
    fn conversation_id_is_required() {
        let err = parse_conversation_id(None, "show <id>").expect_err("missing");
        assert_eq!(err, "usage: show <id>");
        let id = parse_conversation_id(Some(&"42".to_string()), "show <id>").expect("id");
        assert_eq!(id.as_str(), "42");
    }
}
