use super::codec::{self, EngineFrame, OpenHandshake, SocketPacket};
use super::{PushChannel, PushEmit, PushError, PushEvent, PushSink};
use crate::shared::ClientLog;
use chrono::Utc;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

const SOCKET_IDLE_SLEEP: Duration = Duration::from_millis(40);
const EVENT_BUFFER_CAPACITY: usize = 256;
const EMIT_BUFFER_CAPACITY: usize = 64;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Retryable,
    NonRetryable,
}

#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Base push URL (`ws://host:port`); the Socket.IO path is appended.
    pub push_url: String,
    pub session_cookie: Option<String>,
    pub reconnect_backoff: Duration,
    pub log: ClientLog,
}

/// Socket.IO client running on a background thread.
///
/// Lifecycle and server events are buffered for `poll_event`; emits are
/// handed to the worker and dropped while the connection is down, since
/// the dashboard re-joins its room on every (re)connect.
pub struct SocketIoChannel {
    events: Receiver<PushEvent>,
    outgoing: SyncSender<String>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SocketIoChannel {
    pub fn start(options: SocketOptions) -> Self {
        let (event_tx, event_rx) = mpsc::sync_channel(EVENT_BUFFER_CAPACITY);
        let (emit_tx, emit_rx) = mpsc::sync_channel(EMIT_BUFFER_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_worker = Arc::clone(&stop);
        let worker = thread::spawn(move || {
            let mut worker = SocketWorker {
                options,
                events: event_tx,
                outgoing: emit_rx,
                stop: stop_for_worker,
                connected_once: false,
                overflowed: false,
            };
            worker.run();
        });
        Self {
            events: event_rx,
            outgoing: emit_tx,
            stop,
            worker: Some(worker),
        }
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PushSink for SocketIoChannel {
    fn emit(&mut self, emit: PushEmit) -> Result<(), PushError> {
        match self.outgoing.try_send(emit.encode()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(PushError::Protocol("emit buffer is full".to_string()))
            }
            Err(TrySendError::Disconnected(_)) => Err(PushError::Closed),
        }
    }
}

impl PushChannel for SocketIoChannel {
    fn poll_event(&mut self) -> Option<PushEvent> {
        self.events.try_recv().ok()
    }
}

pub fn socket_url(push_url: &str) -> String {
    format!(
        "{}/socket.io/?EIO=4&transport=websocket",
        push_url.trim().trim_end_matches('/')
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionOutcome {
    StopRequested,
    Disconnected(String),
    Rejected(String),
}

struct SocketWorker {
    options: SocketOptions,
    events: SyncSender<PushEvent>,
    outgoing: Receiver<String>,
    stop: Arc<AtomicBool>,
    connected_once: bool,
    overflowed: bool,
}

impl SocketWorker {
    fn run(&mut self) {
        let backoff = self.options.reconnect_backoff.max(Duration::from_millis(1));
        loop {
            if self.should_stop() {
                break;
            }

            let mut socket = match self.open() {
                Ok(socket) => socket,
                Err(err) => {
                    let class = classify_socket_failure(&err.to_string());
                    let message = format_socket_error("push connect failed", &err.to_string(), class);
                    self.options.log.warn("push.connect_failed", &message);
                    if class == RetryClass::NonRetryable {
                        self.forward(PushEvent::Disconnected {
                            reason: message,
                            retrying: false,
                        });
                        break;
                    }
                    if !self.sleep_reconnect(backoff) {
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.process_single_connection(&mut socket);
            let _ = socket.close(None);
            let _ = socket.flush();
            match outcome {
                ConnectionOutcome::StopRequested => break,
                ConnectionOutcome::Disconnected(reason) => {
                    self.options.log.warn("push.disconnected", &reason);
                    self.forward(PushEvent::Disconnected {
                        reason,
                        retrying: true,
                    });
                }
                ConnectionOutcome::Rejected(reason) => {
                    self.options.log.error("push.rejected", &reason);
                    self.forward(PushEvent::Disconnected {
                        reason,
                        retrying: true,
                    });
                }
            }
            if !self.sleep_reconnect(backoff) {
                break;
            }
        }
    }

    fn open(&self) -> Result<WebSocket<MaybeTlsStream<TcpStream>>, PushError> {
        let url = socket_url(&self.options.push_url);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| PushError::Connect(err.to_string()))?;
        if let Some(cookie) = self.options.session_cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| PushError::Connect(format!("invalid session cookie: {err}")))?;
            request.headers_mut().insert("Cookie", value);
        }
        let (mut socket, _) =
            connect(request).map_err(|err| PushError::Connect(err.to_string()))?;
        set_socket_nonblocking(&mut socket)?;
        Ok(socket)
    }

    fn process_single_connection(
        &mut self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    ) -> ConnectionOutcome {
        let opened_at = Instant::now();
        let mut handshake: Option<OpenHandshake> = None;
        let mut joined = false;
        let mut last_seen = Instant::now();

        loop {
            if self.should_stop() {
                return ConnectionOutcome::StopRequested;
            }
            if self.overflowed && joined {
                self.overflowed = false;
                self.forward(PushEvent::RefreshConversations);
            }

            match handshake.as_ref() {
                Some(open) if last_seen.elapsed() > open.liveness_window() => {
                    return ConnectionOutcome::Disconnected("ping timeout".to_string());
                }
                None if opened_at.elapsed() > HANDSHAKE_TIMEOUT => {
                    return ConnectionOutcome::Disconnected("handshake timeout".to_string());
                }
                _ => {}
            }

            if let Err(reason) = self.flush_outgoing(socket, joined) {
                return ConnectionOutcome::Disconnected(reason);
            }

            match socket.read() {
                Ok(Message::Text(text)) => {
                    last_seen = Instant::now();
                    let frame = match codec::decode_frame(text.as_str()) {
                        Ok(frame) => frame,
                        Err(err) => {
                            self.options.log.warn("push.frame_invalid", &err.to_string());
                            continue;
                        }
                    };
                    match frame {
                        EngineFrame::Open(open) => {
                            handshake = Some(open);
                            if let Err(reason) = send_text(socket, codec::encode_connect()) {
                                return ConnectionOutcome::Disconnected(reason);
                            }
                        }
                        EngineFrame::Ping(payload) => {
                            if let Err(reason) = send_text(socket, codec::encode_pong(&payload)) {
                                return ConnectionOutcome::Disconnected(reason);
                            }
                        }
                        EngineFrame::Pong(_) | EngineFrame::Noop => {}
                        EngineFrame::Close => {
                            return ConnectionOutcome::Disconnected(
                                "server closed the session".to_string(),
                            );
                        }
                        EngineFrame::Message(SocketPacket::Connect) => {
                            joined = true;
                            let event = if self.connected_once {
                                PushEvent::Reconnected
                            } else {
                                PushEvent::Connected
                            };
                            self.connected_once = true;
                            self.options.log.info("push.connected", &socket_url(&self.options.push_url));
                            self.forward(event);
                        }
                        EngineFrame::Message(SocketPacket::Disconnect) => {
                            return ConnectionOutcome::Disconnected(
                                "server disconnected the namespace".to_string(),
                            );
                        }
                        EngineFrame::Message(SocketPacket::ConnectError(reason)) => {
                            return ConnectionOutcome::Rejected(reason);
                        }
                        EngineFrame::Message(SocketPacket::Event { name, data }) => {
                            self.forward(PushEvent::from_socket_event(&name, &data, Utc::now()));
                        }
                        EngineFrame::Message(SocketPacket::Unsupported(kind)) => {
                            self.options.log.warn(
                                "push.packet_unsupported",
                                &format!("ignored socket.io packet type `{kind}`"),
                            );
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    last_seen = Instant::now();
                    let _ = socket.send(Message::Pong(payload));
                }
                Ok(Message::Binary(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => {
                    return ConnectionOutcome::Disconnected("websocket closed".to_string());
                }
                Err(tungstenite::Error::Io(err))
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    let _ = socket.flush();
                    thread::sleep(SOCKET_IDLE_SLEEP);
                }
                Err(tungstenite::Error::ConnectionClosed) => {
                    return ConnectionOutcome::Disconnected("websocket closed".to_string());
                }
                Err(err) => {
                    let class = classify_socket_failure(&err.to_string());
                    return ConnectionOutcome::Disconnected(format_socket_error(
                        "push read failed",
                        &err.to_string(),
                        class,
                    ));
                }
            }
        }
    }

    fn flush_outgoing(
        &mut self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        joined: bool,
    ) -> Result<(), String> {
        loop {
            match self.outgoing.try_recv() {
                Ok(frame) if joined => send_text(socket, frame)?,
                Ok(frame) => {
                    self.options
                        .log
                        .warn("push.emit_dropped", &format!("not connected: {frame}"));
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    self.stop.store(true, Ordering::Relaxed);
                    return Ok(());
                }
            }
        }
    }

    fn forward(&mut self, event: PushEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.overflowed = true;
                self.options
                    .log
                    .warn("push.event_dropped", "event buffer full; forcing refresh");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn sleep_reconnect(&self, backoff: Duration) -> bool {
        let mut remaining = backoff + reconnect_jitter(backoff);
        while remaining > Duration::ZERO {
            if self.should_stop() {
                return false;
            }
            let step = remaining.min(Duration::from_millis(25));
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.should_stop()
    }
}

/// Frames that hit `WouldBlock` stay buffered and go out on the next flush.
fn send_text(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    frame: String,
) -> Result<(), String> {
    match socket.send(Message::Text(frame)) {
        Ok(()) => Ok(()),
        Err(tungstenite::Error::Io(err)) if err.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

fn reconnect_jitter(backoff: Duration) -> Duration {
    let ceiling = backoff.min(Duration::from_millis(500)).as_millis() as u64;
    if ceiling == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0_u8; 8];
    let seed = match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos() as u64)
            .unwrap_or(0),
    };
    Duration::from_millis(seed % (ceiling + 1))
}

fn classify_socket_failure(message: &str) -> RetryClass {
    let lower = message.to_ascii_lowercase();
    if ["401", "403", "unauthorized", "forbidden", "invalid session cookie"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        RetryClass::NonRetryable
    } else {
        RetryClass::Retryable
    }
}

fn format_socket_error(context: &str, detail: &str, class: RetryClass) -> String {
    let class = match class {
        RetryClass::Retryable => "retryable",
        RetryClass::NonRetryable => "non_retryable",
    };
    format!("{context} ({class}): {detail}")
}

fn set_socket_nonblocking(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
) -> Result<(), PushError> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_nonblocking(true),
        _ => Ok(()),
    }
    .map_err(PushError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_appends_engine_io_path() {
        assert_eq!(
            socket_url("ws://127.0.0.1:5000/"),
            "ws://127.0.0.1:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn auth_rejections_are_not_retried() {
        assert_eq!(
            classify_socket_failure("HTTP error: 401 Unauthorized"),
            RetryClass::NonRetryable
        );
        assert_eq!(
            classify_socket_failure("Connection refused (os error 111)"),
            RetryClass::Retryable
        );
    }

    #[test]
    fn jitter_stays_within_half_second_cap() {
        for _ in 0..32 {
            assert!(reconnect_jitter(Duration::from_millis(1000)) <= Duration::from_millis(500));
            assert!(reconnect_jitter(Duration::from_millis(100)) <= Duration::from_millis(100));
        }
        assert_eq!(reconnect_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn socket_error_message_includes_details_and_classification() {
        let message = format_socket_error("push connect failed", "tls eof", RetryClass::Retryable);
        assert!(message.contains("push connect failed"));
        assert!(message.contains("tls eof"));
        assert!(message.contains("retryable"));
    }
}
