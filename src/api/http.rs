use super::types::{decode_conversations, decode_transcript, StatusBody};
use super::{AuthStatus, Conversation, DeskApi, DeskError, SendReceipt, TranscriptPayload};
use crate::shared::ConversationId;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// `DeskApi` over the backend's HTTP JSON endpoints, authenticated by the
/// session cookie the backend sets on login.
#[derive(Debug, Clone)]
pub struct HttpDeskApi {
    api_base: String,
    agent: ureq::Agent,
    cookies: CookieJar,
}

impl HttpDeskApi {
    pub fn new(api_base: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirects(0)
            .build();
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            agent,
            cookies: CookieJar::default(),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{encoded}");
        }
        url
    }

    fn get(&mut self, path: &str, query: &[(&str, String)]) -> Result<Value, DeskError> {
        let url = self.endpoint(path, query);
        let request = self.agent.get(&url);
        self.execute(request, None)
    }

    fn post(&mut self, path: &str, body: Value) -> Result<Value, DeskError> {
        let url = self.endpoint(path, &[]);
        let request = self.agent.post(&url);
        self.execute(request, Some(body))
    }

    fn execute(&mut self, request: ureq::Request, body: Option<Value>) -> Result<Value, DeskError> {
        let mut request = request.set("Accept", "application/json");
        if let Some(cookie) = self.cookies.header() {
            request = request.set("Cookie", &cookie);
        }
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                self.cookies.absorb(&response);
                let raw = response.into_string().unwrap_or_default();
                return Err(status_error(status, &raw));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(DeskError::Transport(transport.to_string()))
            }
        };

        self.cookies.absorb(&response);
        let status = response.status();
        if (300..400).contains(&status) {
            return Err(DeskError::Unauthorized {
                message: "Session is no longer valid".to_string(),
            });
        }
        let raw = response
            .into_string()
            .map_err(|e| DeskError::Transport(e.to_string()))?;
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        let body: Value =
            serde_json::from_str(&raw).map_err(|e| DeskError::Decode(e.to_string()))?;
        reject_application_error(&body)?;
        Ok(body)
    }
}

fn status_body(body: &Value) -> StatusBody {
    serde_json::from_value(body.clone()).unwrap_or_default()
}

fn status_error(status: u16, raw: &str) -> DeskError {
    let body = serde_json::from_str::<Value>(raw)
        .map(|value| status_body(&value))
        .unwrap_or_default();
    let message = body
        .message_text()
        .or(body.error)
        .filter(|text| !text.trim().is_empty());
    if status == 401 {
        return DeskError::Unauthorized {
            message: message.unwrap_or_else(|| "Unauthorized".to_string()),
        };
    }
    DeskError::Http {
        status,
        message: message.unwrap_or_else(|| format!("request failed with status {status}")),
    }
}

/// 2xx bodies may still carry `{error}`, `{status:"error"}` or
/// `{success:false}`.
fn reject_application_error(body: &Value) -> Result<(), DeskError> {
    if !body.is_object() {
        return Ok(());
    }
    let parsed = status_body(body);
    if let Some(error) = parsed.error.as_ref().filter(|e| !e.trim().is_empty()) {
        return Err(DeskError::Application(error.clone()));
    }
    let failed_status = parsed
        .status
        .as_deref()
        .is_some_and(|status| status.eq_ignore_ascii_case("error"));
    if failed_status || parsed.success == Some(false) {
        return Err(DeskError::Application(
            parsed
                .message_text()
                .unwrap_or_else(|| "request was rejected".to_string()),
        ));
    }
    Ok(())
}

impl DeskApi for HttpDeskApi {
    fn check_auth(&mut self) -> Result<AuthStatus, DeskError> {
        let body = match self.get("check-auth", &[]) {
            Ok(body) => status_body(&body),
            Err(err) if err.is_auth() => return Ok(AuthStatus::Unauthenticated),
            Err(err) => return Err(err),
        };
        let authenticated = body.is_authenticated.unwrap_or(false);
        match (authenticated, body.agent_id()) {
            (true, Some(agent_id)) => Ok(AuthStatus::Authenticated { agent_id }),
            _ => Ok(AuthStatus::Unauthenticated),
        }
    }

    fn login(&mut self, username: &str, password: &str) -> Result<String, DeskError> {
        let body = self
            .post(
                "login",
                json!({"username": username, "password": password}),
            )
            .map_err(|err| match err {
                DeskError::Http { status: 400, message } => DeskError::Unauthorized { message },
                other => other,
            })?;
        let body = status_body(&body);
        body.agent_id().ok_or_else(|| DeskError::Unauthorized {
            message: body
                .message_text()
                .unwrap_or_else(|| "Login failed".to_string()),
        })
    }

    fn logout(&mut self) -> Result<(), DeskError> {
        self.post("logout", json!({}))?;
        self.cookies = CookieJar::default();
        Ok(())
    }

    fn list_conversations(&mut self) -> Result<Vec<Conversation>, DeskError> {
        let body = self.get("conversations", &[("filter", "all".to_string())])?;
        decode_conversations(&body).map_err(DeskError::Decode)
    }

    fn load_transcript(&mut self, id: &ConversationId) -> Result<TranscriptPayload, DeskError> {
        let body = self.get("messages", &[("conversation_id", id.to_string())])?;
        decode_transcript(&body, id).map_err(DeskError::Decode)
    }

    fn send_message(
        &mut self,
        id: &ConversationId,
        text: &str,
        channel: &str,
    ) -> Result<SendReceipt, DeskError> {
        let body = self.post(
            "chat",
            json!({"convo_id": id, "message": text, "channel": channel}),
        )?;
        let body = status_body(&body);
        Ok(match body.reply.filter(|reply| !reply.trim().is_empty()) {
            Some(reply) => SendReceipt::Reply(reply),
            None => SendReceipt::Accepted,
        })
    }

    fn take_over(&mut self, id: &ConversationId) -> Result<String, DeskError> {
        let body = self.post("handoff", json!({"conversation_id": id}))?;
        Ok(status_body(&body)
            .message_text()
            .unwrap_or_else(|| "Conversation assigned to you".to_string()))
    }

    fn hand_back(&mut self, id: &ConversationId) -> Result<String, DeskError> {
        let body = self.post("handback-to-ai", json!({"conversation_id": id}))?;
        Ok(status_body(&body)
            .message_text()
            .unwrap_or_else(|| "Conversation handed back to AI".to_string()))
    }

    fn fetch_settings(&mut self) -> Result<bool, DeskError> {
        let body = self.get("settings", &[])?;
        status_body(&body)
            .ai_enabled
            .ok_or_else(|| DeskError::Decode("settings response has no `ai_enabled`".to_string()))
    }

    fn set_ai_enabled(&mut self, enabled: bool) -> Result<Option<bool>, DeskError> {
        let value = if enabled { "1" } else { "0" };
        let body = self.post("settings", json!({"key": "ai_enabled", "value": value}))?;
        Ok(status_body(&body).ai_enabled)
    }

    fn session_token(&self) -> Option<String> {
        self.cookies.header()
    }

    fn restore_session_token(&mut self, token: Option<&str>) {
        self.cookies = token.map(CookieJar::from_header).unwrap_or_default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    fn from_header(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .collect();
        Self { cookies }
    }

    fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn absorb(&mut self, response: &ureq::Response) {
        for raw in response.all("set-cookie") {
            self.apply_set_cookie(raw, Utc::now());
        }
    }

    fn apply_set_cookie(&mut self, raw: &str, now: DateTime<Utc>) {
        let mut parts = raw.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().trim_matches('"');

        let mut expired = value.is_empty();
        for attribute in parts {
            let Some((key, attr_value)) = attribute.split_once('=') else {
                continue;
            };
            let attr_value = attr_value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "max-age" => {
                    if attr_value.parse::<i64>().is_ok_and(|age| age <= 0) {
                        expired = true;
                    }
                }
                "expires" => {
                    if DateTime::parse_from_rfc2822(attr_value)
                        .is_ok_and(|expires| expires.with_timezone(&Utc) <= now)
                    {
                        expired = true;
                    }
                }
                _ => {}
            }
        }

        if expired {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }
}
