use frontdesk::api::{AuthStatus, Channel, DeskApi, DeskError, HttpDeskApi, SendReceipt, Sender};
use frontdesk::shared::ConversationId;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    cookie: String,
    body: String,
}

impl RecordedRequest {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

struct MockResponse {
    status: u16,
    body: String,
    set_cookie: Option<&'static str>,
}

fn ok(body: &str) -> MockResponse {
    MockResponse {
        status: 200,
        body: body.to_string(),
        set_cookie: None,
    }
}

fn status(status: u16, body: &str) -> MockResponse {
    MockResponse {
        status,
        body: body.to_string(),
        set_cookie: None,
    }
}

struct MockDeskServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockDeskServer {
    fn start<F>(expected_requests: usize, responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_thread = Arc::clone(&requests);
        let responder = Arc::new(responder);

        let handle = thread::spawn(move || {
            for _ in 0..expected_requests {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

                let mut request_line = String::new();
                reader
                    .read_line(&mut request_line)
                    .expect("read request line");
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or("GET").to_string();
                let path = parts.next().unwrap_or("/").to_string();

                let mut cookie = String::new();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("read header");
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if lower.starts_with("cookie:") {
                        cookie = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().to_string())
                            .unwrap_or_default();
                    }
                    if lower.starts_with("content-length:") {
                        content_length = line
                            .split_once(':')
                            .map(|(_, v)| v.trim().parse::<usize>().unwrap_or(0))
                            .unwrap_or(0);
                    }
                }

                let mut body = vec![0_u8; content_length];
                if content_length > 0 {
                    reader.read_exact(&mut body).expect("read body");
                }
                let request = RecordedRequest {
                    method,
                    path,
                    cookie,
                    body: String::from_utf8_lossy(&body).to_string(),
                };

                let response = responder(&request);
                requests_for_thread
                    .lock()
                    .expect("lock requests")
                    .push(request);

                let cookie_header = response
                    .set_cookie
                    .map(|cookie| format!("Set-Cookie: {cookie}\r\n"))
                    .unwrap_or_default();
                let raw = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    cookie_header,
                    response.body.len(),
                    response.body
                );
                stream.write_all(raw.as_bytes()).expect("write response");
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("join mock server");
        }
        self.requests.lock().expect("lock requests").clone()
    }
}

#[test]
fn login_keeps_session_cookie_for_later_requests() {
    let server = MockDeskServer::start(3, |request| match request.path.as_str() {
        "/login" => MockResponse {
            status: 200,
            body: r#"{"success":true,"agent":{"username":"agent1"}}"#.to_string(),
            set_cookie: Some("session=abc123; HttpOnly; Path=/"),
        },
        "/check-auth" => ok(r#"{"is_authenticated":true,"agent":"agent1"}"#),
        "/logout" => MockResponse {
            status: 200,
            body: r#"{"message":"Logged out"}"#.to_string(),
            set_cookie: Some("session=; Max-Age=0; Path=/"),
        },
        other => panic!("unexpected path {other}"),
    });

    let mut api = HttpDeskApi::new(&format!("{}/", server.base_url));
    let agent = api.login("agent1", "secret").expect("login");
    assert_eq!(agent, "agent1");
    assert_eq!(api.session_token().as_deref(), Some("session=abc123"));
    assert_eq!(
        api.check_auth().expect("check auth"),
        AuthStatus::Authenticated {
            agent_id: "agent1".to_string()
        }
    );
    api.logout().expect("logout");
    assert_eq!(api.session_token(), None);

    let requests = server.finish();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].cookie, "");
    assert_eq!(requests[0].json()["username"], "agent1");
    assert_eq!(requests[0].json()["password"], "secret");
    assert_eq!(requests[1].method, "GET");
    assert_eq!(requests[1].cookie, "session=abc123");
    assert_eq!(requests[2].cookie, "session=abc123");
}

#[test]
fn rejected_login_and_expired_session_are_auth_outcomes() {
    let server = MockDeskServer::start(2, |request| match request.path.as_str() {
        "/login" => status(400, r#"{"message":"Invalid username or password"}"#),
        "/check-auth" => status(401, r#"{"error":"Unauthorized"}"#),
        other => panic!("unexpected path {other}"),
    });

    let mut api = HttpDeskApi::new(&server.base_url);
    let err = api.login("agent1", "wrong").expect_err("rejected");
    assert!(err.is_auth());
    assert_eq!(err.user_message(), "Invalid username or password");
    assert_eq!(
        api.check_auth().expect("401 is a status"),
        AuthStatus::Unauthenticated
    );
    server.finish();
}

#[test]
fn conversation_list_and_transcript_decode_legacy_shapes() {
    let server = MockDeskServer::start(2, |request| {
        if request.path == "/conversations?filter=all" {
            return ok(
                r#"{"conversations":[
                    {"id":42,"username":"Ana","channel":"whatsapp","needs_agent":"1","assigned_agent":null,"latest_message":"Is the pool open?"},
                    {"convo_id":"ig-7","username":"Bo","channel":"instagram","needs_agent":false,"assigned_agent":"agent2"}
                ]}"#,
            );
        }
        if request.path == "/messages?conversation_id=42" {
            return ok(
                r#"{"conversation":{"username":"Ana","channel":"whatsapp"},"messages":[
                    {"sender":"user","message":"Hi","timestamp":"2026-03-01 09:00:00"},
                    {"sender":"bot","message":"Hello!","timestamp":"2026-03-01T09:00:05Z"}
                ]}"#,
            );
        }
        panic!("unexpected path {}", request.path)
    });

    let mut api = HttpDeskApi::new(&server.base_url);
    let list = api.list_conversations().expect("list");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id.as_str(), "42");
    assert!(list[0].needs_agent);
    assert_eq!(list[0].channel, Channel::Whatsapp);
    assert_eq!(list[0].latest_message_preview, "Is the pool open?");
    assert_eq!(list[1].assigned_agent.as_deref(), Some("agent2"));

    let transcript = api.load_transcript(&list[0].id).expect("transcript");
    assert_eq!(transcript.username, "Ana");
    assert_eq!(transcript.channel, Some(Channel::Whatsapp));
    let senders = transcript
        .messages
        .iter()
        .map(|message| message.sender)
        .collect::<Vec<_>>();
    assert_eq!(senders, vec![Sender::User, Sender::Ai]);
    server.finish();
}

#[test]
fn actions_post_the_canonical_payloads() {
    let server = MockDeskServer::start(5, |request| match request.path.as_str() {
        "/chat" => ok(r#"{"status":"ok"}"#),
        "/handoff" => ok(r#"{"message":"Conversation assigned to agent1"}"#),
        "/handback-to-ai" => ok(r#"{}"#),
        "/settings" if request.method == "GET" => ok(r#"{"ai_enabled":"1"}"#),
        "/settings" => ok(r#"{"success":true,"ai_enabled":"0"}"#),
        other => panic!("unexpected path {other}"),
    });

    let mut api = HttpDeskApi::new(&server.base_url);
    let id = ConversationId::parse("42").expect("id");
    assert_eq!(
        api.send_message(&id, "Yes, until 10pm", "whatsapp")
            .expect("send"),
        SendReceipt::Accepted
    );
    assert_eq!(
        api.take_over(&id).expect("take over"),
        "Conversation assigned to agent1"
    );
    assert_eq!(
        api.hand_back(&id).expect("hand back"),
        "Conversation handed back to AI"
    );
    assert!(api.fetch_settings().expect("settings"));
    assert_eq!(api.set_ai_enabled(false).expect("toggle"), Some(false));

    let requests = server.finish();
    let chat = requests[0].json();
    assert_eq!(chat["convo_id"], 42);
    assert_eq!(chat["message"], "Yes, until 10pm");
    assert_eq!(chat["channel"], "whatsapp");
    assert_eq!(requests[1].json()["conversation_id"], 42);
    assert_eq!(requests[2].path, "/handback-to-ai");
    assert_eq!(requests[4].json()["key"], "ai_enabled");
    assert_eq!(requests[4].json()["value"], "0");
}

#[test]
fn server_errors_carry_the_server_message() {
    let server = MockDeskServer::start(2, |request| match request.path.as_str() {
        "/conversations?filter=all" => {
            status(500, r#"{"error":"Failed to retrieve conversations"}"#)
        }
        "/handoff" => ok(r#"{"error":"Conversation already assigned"}"#),
        other => panic!("unexpected path {other}"),
    });

    let mut api = HttpDeskApi::new(&server.base_url);
    assert_eq!(
        api.list_conversations().expect_err("500"),
        DeskError::Http {
            status: 500,
            message: "Failed to retrieve conversations".to_string()
        }
    );
    let id = ConversationId::parse("9").expect("id");
    assert_eq!(
        api.take_over(&id).expect_err("application error"),
        DeskError::Application("Conversation already assigned".to_string())
    );
    server.finish();
}

#[test]
fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut api = HttpDeskApi::new(&format!("http://{addr}"));
    let err = api.list_conversations().expect_err("refused");
    assert!(matches!(err, DeskError::Transport(_)), "{err:?}");
    assert!(err.user_message().starts_with("Network error"));
}
