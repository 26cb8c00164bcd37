use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const SESSION_COOKIE: &str = "session=abc123";

#[derive(Debug)]
struct DeskState {
    ai_enabled: bool,
    conversations: Vec<Value>,
    messages: BTreeMap<String, Vec<Value>>,
    requests: Vec<String>,
}

impl DeskState {
    fn seeded() -> Self {
        let mut messages = BTreeMap::new();
        messages.insert(
            "42".to_string(),
            vec![
                json!({"sender":"user","message":"Is the pool open late?","timestamp":"2026-03-01 21:00:00"}),
                json!({"sender":"ai","message":"The pool closes at 9pm.","timestamp":"2026-03-01 21:00:04"}),
            ],
        );
        Self {
            ai_enabled: true,
            conversations: vec![
                json!({"id":42,"username":"Ana","channel":"whatsapp","needs_agent":true,"assigned_agent":null,"latest_message":"Is the pool open late?"}),
                json!({"id":43,"username":"Bo","channel":"webchat","needs_agent":false,"assigned_agent":"agent2","latest_message":"Thanks!"}),
            ],
            messages,
            requests: Vec::new(),
        }
    }

    fn conversation_mut(&mut self, id: &Value) -> Option<&mut Value> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation["id"] == *id)
    }
}

struct Reply {
    status: u16,
    body: Value,
    set_cookie: Option<&'static str>,
}

fn reply(body: Value) -> Reply {
    Reply {
        status: 200,
        body,
        set_cookie: None,
    }
}

fn route(state: &mut DeskState, method: &str, path: &str, cookie: &str, body: &Value) -> Reply {
    let signed_in = cookie.contains(SESSION_COOKIE);
    match (method, path) {
        ("POST", "/login") => {
            if body["password"] == "pw" {
                Reply {
                    status: 200,
                    body: json!({"success": true, "agent": {"username": body["username"]}}),
                    set_cookie: Some("session=abc123; HttpOnly; Path=/"),
                }
            } else {
                Reply {
                    status: 400,
                    body: json!({"message": "Invalid username or password"}),
                    set_cookie: None,
                }
            }
        }
        ("GET", "/check-auth") if signed_in => {
            reply(json!({"is_authenticated": true, "agent": "agent1"}))
        }
        ("POST", "/logout") => Reply {
            status: 200,
            body: json!({"message": "Logged out"}),
            set_cookie: Some("session=; Max-Age=0; Path=/"),
        },
        (_, _) if !signed_in => Reply {
            status: 401,
            body: json!({"error": "Unauthorized"}),
            set_cookie: None,
        },
        ("GET", "/conversations?filter=all") => {
            reply(json!({"conversations": state.conversations.clone()}))
        }
        ("GET", path) if path.starts_with("/messages?conversation_id=") => {
            let id = path.trim_start_matches("/messages?conversation_id=");
            let conversation = state
                .conversations
                .iter()
                .find(|conversation| conversation["id"].to_string() == id)
                .cloned()
                .unwrap_or(Value::Null);
            reply(json!({
                "conversation": {"username": conversation["username"], "channel": conversation["channel"]},
                "messages": state.messages.get(id).cloned().unwrap_or_default(),
            }))
        }
        ("POST", "/chat") => {
            let id = body["convo_id"].to_string();
            state.messages.entry(id).or_default().push(json!({
                "sender": "agent",
                "message": body["message"],
                "timestamp": "2026-03-01 21:01:00",
            }));
            reply(json!({"status": "ok"}))
        }
        ("POST", "/handoff") => {
            if let Some(conversation) = state.conversation_mut(&body["conversation_id"]) {
                conversation["assigned_agent"] = json!("agent1");
                conversation["needs_agent"] = json!(false);
            }
            reply(json!({"message": "Conversation assigned to agent1"}))
        }
        ("POST", "/handback-to-ai") => {
            if let Some(conversation) = state.conversation_mut(&body["conversation_id"]) {
                conversation["assigned_agent"] = Value::Null;
            }
            reply(json!({"message": "Conversation handed back to AI"}))
        }
        ("GET", "/settings") => {
            reply(json!({"ai_enabled": if state.ai_enabled { "1" } else { "0" }}))
        }
        ("POST", "/settings") => {
            state.ai_enabled = body["value"] == "1";
            reply(json!({"success": true, "ai_enabled": body["value"]}))
        }
        _ => Reply {
            status: 404,
            body: json!({"error": "Not found"}),
            set_cookie: None,
        },
    }
}

struct MockDesk {
    base_url: String,
    state: Arc<Mutex<DeskState>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockDesk {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock desk");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(DeskState::seeded()));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => serve(stream, &state_for_thread),
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            stop,
            handle: Some(handle),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.state.lock().expect("lock state").requests.clone()
    }

    fn ai_enabled(&self) -> bool {
        self.state.lock().expect("lock state").ai_enabled
    }
}

impl Drop for MockDesk {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(stream: TcpStream, state: &Arc<Mutex<DeskState>>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("GET").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let mut cookie = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line == "\r\n" || line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some((_, value)) = line.split_once(':') {
            if lower.starts_with("cookie:") {
                cookie = value.trim().to_string();
            }
            if lower.starts_with("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut raw_body = vec![0_u8; content_length];
    if content_length > 0 && reader.read_exact(&mut raw_body).is_err() {
        return;
    }
    let body: Value = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);

    let response = {
        let mut state = state.lock().expect("lock state");
        state.requests.push(format!("{method} {path}"));
        route(&mut state, &method, &path, &cookie, &body)
    };
    let payload = response.body.to_string();
    let cookie_header = response
        .set_cookie
        .map(|cookie| format!("Set-Cookie: {cookie}\r\n"))
        .unwrap_or_default();
    let raw = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\n{cookie_header}Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        response.status,
        payload.len(),
    );
    let mut stream = stream;
    let _ = stream.write_all(raw.as_bytes());
}

fn write_config(home: &Path, api_base: &str) -> std::path::PathBuf {
    let path = home.join("frontdesk.yaml");
    fs::write(
        &path,
        format!("api_base: {api_base}\nreconnect_backoff_ms: 100\ntimezone: UTC\n"),
    )
    .expect("write config");
    path
}

fn run(home: &Path, args: &[&str]) -> Output {
    run_with_env(home, args, &[])
}

fn run_with_env(home: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_frontdesk"));
    cmd.args(args)
        .env("HOME", home)
        .env_remove("FRONTDESK_CONFIG")
        .env_remove("FRONTDESK_TUI_SCRIPT_KEYS");
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().expect("run frontdesk")
}

fn run_desk(home: &Path, config: &Path, args: &[&str]) -> Output {
    let config = config.display().to_string();
    run_with_env(home, args, &[("FRONTDESK_CONFIG", config.as_str())])
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

fn assert_err_contains(output: &Output, needle: &str) {
    assert!(
        !output.status.success(),
        "expected failure, stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
    let text = format!("{}{}", stdout(output), stderr(output));
    assert!(
        text.contains(needle),
        "expected error to contain `{needle}`, got:\n{text}"
    );
}

fn kv_lines(output: &Output) -> BTreeMap<String, String> {
    stdout(output)
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn help_lists_commands_without_config() {
    let temp = tempdir().expect("tempdir");
    for args in [&[][..], &["help"][..], &["--help"][..]] {
        let output = run(temp.path(), args);
        assert_ok(&output);
        let text = stdout(&output);
        assert!(text.contains("login <username> <password>"), "{text}");
        assert!(text.contains("take-over <id>"), "{text}");
        assert!(text.contains("watch [--filter F] [--channel C]"), "{text}");
    }
}

#[test]
fn unknown_command_and_bad_usage_exit_nonzero() {
    let temp = tempdir().expect("tempdir");
    assert_err_contains(&run(temp.path(), &["handoff", "42"]), "unknown command `handoff`");
    assert_err_contains(&run(temp.path(), &["login", "agent1"]), "usage: login");
    assert_err_contains(&run(temp.path(), &["show"]), "usage: show <id>");
    assert_err_contains(&run(temp.path(), &["ai", "sometimes"]), "invalid ai value");
}

#[test]
fn missing_config_file_is_reported_with_its_path() {
    let temp = tempdir().expect("tempdir");
    let output = run(temp.path(), &["status"]);
    assert_err_contains(&output, ".frontdesk/config.yaml");
}

#[test]
fn signed_out_commands_ask_for_login() {
    let desk = MockDesk::start();
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path(), &desk.base_url);

    let status = run_desk(temp.path(), &config, &["status"]);
    assert_ok(&status);
    let fields = kv_lines(&status);
    assert_eq!(fields.get("session").map(String::as_str), Some("signed_out"));
    assert_eq!(fields.get("api_base"), Some(&desk.base_url));

    let list = run_desk(temp.path(), &config, &["conversations"]);
    assert_err_contains(&list, "not signed in; run `frontdesk login");

    let login = run_desk(temp.path(), &config, &["login", "agent1", "wrong"]);
    assert_err_contains(&login, "Invalid username or password");
    assert!(!temp.path().join(".frontdesk/session.json").exists());
}

#[test]
fn agent_workflow_across_one_shot_commands() {
    let desk = MockDesk::start();
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path(), &desk.base_url);

    let login = run_desk(temp.path(), &config, &["login", "agent1", "pw"]);
    assert_ok(&login);
    assert!(stdout(&login).starts_with("login complete"));
    assert_eq!(kv_lines(&login).get("agent").map(String::as_str), Some("agent1"));
    let session = fs::read_to_string(temp.path().join(".frontdesk/session.json"))
        .expect("session persisted");
    assert!(session.contains(SESSION_COOKIE), "{session}");

    let status = run_desk(temp.path(), &config, &["status"]);
    assert_ok(&status);
    let fields = kv_lines(&status);
    assert_eq!(fields.get("session").map(String::as_str), Some("signed_in"));
    assert_eq!(fields.get("agent").map(String::as_str), Some("agent1"));
    assert_eq!(fields.get("ai_enabled").map(String::as_str), Some("true"));
    assert_eq!(fields.get("count_unassigned").map(String::as_str), Some("1"));
    assert_eq!(fields.get("count_team").map(String::as_str), Some("1"));
    assert_eq!(fields.get("count_all").map(String::as_str), Some("2"));

    let unassigned = run_desk(
        temp.path(),
        &config,
        &["conversations", "--filter", "unassigned"],
    );
    assert_ok(&unassigned);
    let text = stdout(&unassigned);
    assert!(text.contains("filter=unassigned"), "{text}");
    assert!(text.contains("counts=unassigned:1 yours:0 team:1 all:2"), "{text}");
    assert!(text.contains("conversations=1"), "{text}");
    assert!(text.contains(" 42 [whatsapp] Ana !needs-agent | Is the pool open late?"), "{text}");

    let show = run_desk(temp.path(), &config, &["show", "42"]);
    assert_ok(&show);
    let transcript = stdout(&show);
    assert!(transcript.contains("guest=Ana"), "{transcript}");
    assert!(transcript.contains("--- Mar 1, 2026 ---"), "{transcript}");
    assert!(transcript.contains("[21:00] guest: Is the pool open late?"), "{transcript}");
    assert!(transcript.contains("ai: The pool closes at 9pm."), "{transcript}");

    let send = run_desk(
        temp.path(),
        &config,
        &["send", "42", "It", "is", "open", "until", "10pm"],
    );
    assert_ok(&send);
    assert_eq!(kv_lines(&send).get("transport").map(String::as_str), Some("http"));

    let take_over = run_desk(temp.path(), &config, &["take-over", "42"]);
    assert_ok(&take_over);
    let fields = kv_lines(&take_over);
    assert_eq!(fields.get("assigned_agent").map(String::as_str), Some("agent1"));
    assert_eq!(
        fields.get("message").map(String::as_str),
        Some("Conversation assigned to agent1")
    );

    let yours = run_desk(temp.path(), &config, &["list", "--filter", "yours"]);
    assert_ok(&yours);
    let text = stdout(&yours);
    assert!(text.contains("conversations=1"), "{text}");
    assert!(text.contains("@agent1"), "{text}");

    let show = run_desk(temp.path(), &config, &["show", "42"]);
    assert!(stdout(&show).contains("agent: It is open until 10pm"));

    let hand_back = run_desk(temp.path(), &config, &["hand-back", "42"]);
    assert_ok(&hand_back);
    assert!(stdout(&hand_back).contains("message=Conversation handed back to AI"));

    let ai_off = run_desk(temp.path(), &config, &["ai", "off"]);
    assert_ok(&ai_off);
    assert_eq!(stdout(&ai_off).trim(), "ai_enabled=false");
    assert!(!desk.ai_enabled());
    let ai = run_desk(temp.path(), &config, &["ai"]);
    assert_eq!(stdout(&ai).trim(), "ai_enabled=false");

    let logs = run_desk(temp.path(), &config, &["logs"]);
    assert_ok(&logs);
    let logs = stdout(&logs);
    assert!(logs.contains("\"event\":\"settings.ai_enabled\""), "{logs}");
    assert!(logs.contains("\"event\":\"handoff.take_over\""), "{logs}");

    let logout = run_desk(temp.path(), &config, &["logout"]);
    assert_ok(&logout);
    let fields = kv_lines(&logout);
    assert_eq!(fields.get("was_signed_in").map(String::as_str), Some("true"));
    assert_eq!(fields.get("server_logout").map(String::as_str), Some("ok"));
    assert!(!temp.path().join(".frontdesk/session.json").exists());

    let status = run_desk(temp.path(), &config, &["status"]);
    assert_eq!(
        kv_lines(&status).get("session").map(String::as_str),
        Some("signed_out")
    );

    let requests = desk.requests();
    assert!(requests.contains(&"POST /chat".to_string()));
    assert!(requests.contains(&"POST /handoff".to_string()));
    assert!(requests.contains(&"POST /handback-to-ai".to_string()));
    assert!(requests.contains(&"POST /settings".to_string()));
}

#[test]
fn watch_runs_scripted_login_and_opens_first_conversation() {
    let desk = MockDesk::start();
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path(), &desk.base_url);
    let config = config.display().to_string();

    let output = run_with_env(
        temp.path(),
        &["watch"],
        &[
            ("FRONTDESK_CONFIG", config.as_str()),
            (
                "FRONTDESK_TUI_SCRIPT_KEYS",
                "a,g,e,n,t,1,tab,p,w,enter,enter,q",
            ),
        ],
    );
    assert_ok(&output);
    let fields = kv_lines(&output);
    assert_eq!(fields.get("view").map(String::as_str), Some("dashboard"));
    assert_eq!(fields.get("agent").map(String::as_str), Some("agent1"));
    assert_eq!(fields.get("conversations").map(String::as_str), Some("2"));
    assert_eq!(fields.get("active").map(String::as_str), Some("42"));
    assert_eq!(fields.get("messages").map(String::as_str), Some("2"));
    assert_eq!(fields.get("ai_enabled").map(String::as_str), Some("true"));

    let logs = fs::read_to_string(temp.path().join(".frontdesk/logs/client.log"))
        .expect("client log");
    assert!(logs.contains("watch.started"));
    assert!(logs.contains("watch.stopped"));
}

#[test]
fn watch_applies_initial_filter_for_restored_session() {
    let desk = MockDesk::start();
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path(), &desk.base_url);
    assert_ok(&run_desk(temp.path(), &config, &["login", "agent1", "pw"]));
    let config = config.display().to_string();

    let output = run_with_env(
        temp.path(),
        &["watch", "--filter", "team"],
        &[
            ("FRONTDESK_CONFIG", config.as_str()),
            ("FRONTDESK_TUI_SCRIPT_KEYS", "q"),
        ],
    );
    assert_ok(&output);
    let fields = kv_lines(&output);
    assert_eq!(fields.get("view").map(String::as_str), Some("dashboard"));
    assert_eq!(fields.get("filter").map(String::as_str), Some("team"));
    assert_eq!(fields.get("conversations").map(String::as_str), Some("1"));

    let bad_keys = run_with_env(
        temp.path(),
        &["watch"],
        &[
            ("FRONTDESK_CONFIG", config.as_str()),
            ("FRONTDESK_TUI_SCRIPT_KEYS", "page-down"),
        ],
    );
    assert_err_contains(&bad_keys, "invalid FRONTDESK_TUI_SCRIPT_KEYS token `page-down`");
}
