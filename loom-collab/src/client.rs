//! Realtime transport: one WebSocket per project, with reconnect/backoff.
//!
//! ```text
//!            connect(token)
//!   Idle ───────────────────► Connecting ──open──► Open ──close 1000──► Closed{1000}
//!    ▲                          ▲    │               │
//!    │ disconnect()             │    │ fail          │ close ≠ 1000
//!    │                          │    ▼               ▼
//!    └──── Closing ◄────────  Reconnecting{attempt, delay} ──attempt == max──► Failed
//! ```
//!
//! The socket lives in its own task. Outbound frames are handed to it over
//! an mpsc channel and are best effort: nothing is queued across a
//! disconnect. The credential is read once per `connect` call and carried as
//! the `jwt.<token>` WebSocket sub-protocol.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use loom_core::Operation;

use crate::protocol::{CollabMessage, PresenceUpdate, ProtocolError};

/// Close code for a deliberate, clean shutdown.
pub const NORMAL_CLOSE: u16 = 1000;

/// Close code used when the connection dropped without a close frame,
/// including failed connection attempts.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Project id of a document that has never been saved.
pub const UNSAVED_PROJECT_ID: &str = "new";

/// How long `disconnect` waits for the socket task before aborting it.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Configuration ──────────────────────────────────────────────

/// Exponential backoff for abnormal closes.
///
/// Retry `n` (1-based) waits `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Millisecond-scale delays so tests can exhaust the policy quickly.
    pub fn for_testing() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(40),
            max_attempts: 5,
        }
    }

    /// Delay before retry number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Next `(attempt, delay)` after `attempt` failed retries, or `None`
    /// once the budget is spent.
    pub fn next(&self, attempt: u32) -> Option<(u32, Duration)> {
        (attempt < self.max_attempts).then(|| {
            let next = attempt + 1;
            (next, self.delay_for(next))
        })
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket origin, e.g. `wss://collab.example.com`
    pub base_url: String,
    pub reconnect: ReconnectPolicy,
    /// Outbound frames buffered between the caller and the socket task
    pub outbound_capacity: usize,
    /// Transport events buffered for the consumer
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:9090".to_string(),
            reconnect: ReconnectPolicy::default(),
            outbound_capacity: 256,
            event_capacity: 256,
        }
    }
}

impl TransportConfig {
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect: ReconnectPolicy::for_testing(),
            outbound_capacity: 64,
            event_capacity: 64,
        }
    }

    /// Endpoint for one project.
    pub fn project_url(&self, project_id: &str) -> String {
        format!("{}/projects/{project_id}/ws", self.base_url.trim_end_matches('/'))
    }
}

// ─── State & events ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed { code: u16 },
    Reconnecting { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
    MissingToken,
}

/// Events emitted by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(CollabMessage),
    Closed { code: u16, reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
    MissingToken,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Authentication token is missing.")]
    MissingToken,
    #[error("Document has not been saved yet")]
    UnsavedDocument,
    #[error("Not connected")]
    NotConnected,
    #[error("Refusing to send an empty patch")]
    EmptyPatch,
    #[error("Outbound buffer full, frame dropped")]
    Backpressure,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

// ─── Client ─────────────────────────────────────────────────────

/// The realtime transport for one project.
pub struct CollabClient {
    project_id: String,
    config: TransportConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl CollabClient {
    pub fn new(project_id: impl Into<String>, config: TransportConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            project_id: project_id.into(),
            config,
            state: Arc::new(state),
            event_tx,
            event_rx: Some(event_rx),
            outgoing_tx: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start connecting with `token`.
    ///
    /// Returns once the socket task is running; `TransportEvent::Opened`
    /// follows when the handshake completes. Any previous connection is torn
    /// down first, so calling this again after `Failed` starts a fresh retry
    /// budget.
    pub async fn connect(&mut self, token: &str) -> Result<(), TransportError> {
        if self.project_id.is_empty() || self.project_id == UNSAVED_PROJECT_ID {
            log::debug!("Not connecting: project has not been saved");
            return Err(TransportError::UnsavedDocument);
        }
        self.disconnect().await;

        let token = token.trim();
        if token.is_empty() {
            log::warn!("Authentication token is missing, connection not attempted");
            self.state.send_replace(ConnectionState::MissingToken);
            let _ = self.event_tx.try_send(TransportEvent::MissingToken);
            return Err(TransportError::MissingToken);
        }

        let url = self.config.project_url(&self.project_id);
        build_request(&url, token)?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel(self.config.outbound_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = ConnectionTask {
            url,
            token: token.to_owned(),
            policy: self.config.reconnect,
            state: self.state.clone(),
            events: self.event_tx.clone(),
            outgoing: outgoing_rx,
            shutdown: shutdown_rx,
        };

        self.outgoing_tx = Some(outgoing_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Close with code 1000 and cancel any pending reconnect.
    pub async fn disconnect(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.take() {
            shutdown.send_replace(true);
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(TEARDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("Connection task for project {} ended abnormally: {e}", self.project_id);
                }
                Err(_) => {
                    log::warn!("Connection task for project {} did not stop in time, aborting", self.project_id);
                    task.abort();
                }
            }
        }
        self.outgoing_tx = None;
        self.state.send_if_modified(|state| match state {
            ConnectionState::MissingToken | ConnectionState::Idle => false,
            _ => {
                *state = ConnectionState::Idle;
                true
            }
        });
    }

    /// Send a patch frame. Empty op lists are never sent.
    pub fn send_patch(&self, ops: &[Operation]) -> Result<(), TransportError> {
        if ops.is_empty() {
            return Err(TransportError::EmptyPatch);
        }
        self.send(&CollabMessage::patch(ops.to_vec()))
    }

    pub fn send_presence(&self, update: &PresenceUpdate) -> Result<(), TransportError> {
        self.send(&CollabMessage::Presence(update.clone()))
    }

    fn send(&self, msg: &CollabMessage) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Open {
            return Err(TransportError::NotConnected);
        }
        let tx = self.outgoing_tx.as_ref().ok_or(TransportError::NotConnected)?;
        let text = msg.encode()?;
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }
}

fn build_request(url: &str, token: &str) -> Result<Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    let protocol = HeaderValue::from_str(&format!("jwt.{token}"))
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    Ok(request)
}

// ─── Connection task ────────────────────────────────────────────

/// Why one connection ended.
enum Exit {
    Shutdown,
    Closed { code: u16, reason: String },
}

struct ConnectionTask {
    url: String,
    token: String,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::Sender<TransportEvent>,
    outgoing: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
}

/// Resolves once shutdown is requested or the client is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl ConnectionTask {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Deliver `event`, waiting for room in the channel. Returns `false`
    /// when shutdown was requested while waiting.
    async fn emit(&mut self, event: TransportEvent) -> bool {
        tokio::select! {
            sent = self.events.send(event) => {
                if sent.is_err() {
                    log::trace!("Transport event dropped, receiver gone");
                }
                true
            }
            _ = shutdown_requested(&mut self.shutdown) => false,
        }
    }

    async fn run(mut self) {
        let mut attempt = 0;
        loop {
            let (code, reason) = match self.connect_once(&mut attempt).await {
                Exit::Shutdown => break,
                Exit::Closed { code, reason } => (code, reason),
            };
            if !self.emit(TransportEvent::Closed { code, reason: reason.clone() }).await {
                break;
            }

            if code == NORMAL_CLOSE {
                log::info!("Connection to {} closed normally", self.url);
                self.set_state(ConnectionState::Closed { code });
                return;
            }

            match self.policy.next(attempt) {
                Some((next, delay)) => {
                    attempt = next;
                    log::warn!(
                        "Connection closed: {reason} (Code: {code}). Reconnecting in {}ms (attempt {attempt})",
                        delay.as_millis()
                    );
                    self.set_state(ConnectionState::Reconnecting { attempt, delay });
                    if !self.emit(TransportEvent::Reconnecting { attempt, delay }).await {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_requested(&mut self.shutdown) => break,
                    }
                }
                None => {
                    log::error!("Could not reconnect to {} after {attempt} attempts", self.url);
                    self.set_state(ConnectionState::Failed { attempts: attempt });
                    self.emit(TransportEvent::Failed { attempts: attempt }).await;
                    return;
                }
            }
        }
        self.set_state(ConnectionState::Idle);
    }

    /// Send close 1000 on a client-requested shutdown.
    async fn close_normally<S>(&self, ws_sender: &mut S) -> Exit
    where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        self.set_state(ConnectionState::Closing);
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "Client initiated disconnect".into(),
        };
        if let Err(e) = ws_sender.send(Message::Close(Some(frame))).await {
            log::debug!("Close frame not delivered: {e}");
        }
        Exit::Shutdown
    }

    async fn connect_once(&mut self, attempt: &mut u32) -> Exit {
        self.set_state(ConnectionState::Connecting);
        log::debug!("Connecting to {}", self.url);

        let request = match build_request(&self.url, &self.token) {
            Ok(request) => request,
            Err(e) => {
                return Exit::Closed {
                    code: ABNORMAL_CLOSE,
                    reason: e.to_string(),
                }
            }
        };

        let connected = tokio::select! {
            result = tokio_tungstenite::connect_async(request) => result,
            _ = shutdown_requested(&mut self.shutdown) => return Exit::Shutdown,
        };
        let ws_stream = match connected {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                log::debug!("Connection to {} failed: {e}", self.url);
                return Exit::Closed {
                    code: ABNORMAL_CLOSE,
                    reason: e.to_string(),
                };
            }
        };

        *attempt = 0;
        // Frames sent before this connection opened are stale.
        while self.outgoing.try_recv().is_ok() {}
        log::info!("WebSocket connection established to {}", self.url);
        self.set_state(ConnectionState::Open);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        if !self.emit(TransportEvent::Opened).await {
            return self.close_normally(&mut ws_sender).await;
        }
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown) => {
                    return self.close_normally(&mut ws_sender).await;
                }

                outgoing = self.outgoing.recv() => {
                    let Some(text) = outgoing else {
                        return Exit::Shutdown;
                    };
                    if let Err(e) = ws_sender.send(Message::text(text)).await {
                        return Exit::Closed { code: ABNORMAL_CLOSE, reason: e.to_string() };
                    }
                }

                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => match CollabMessage::decode(text.as_str()) {
                        Ok(msg) => {
                            if !self.emit(TransportEvent::Message(msg)).await {
                                return self.close_normally(&mut ws_sender).await;
                            }
                        }
                        Err(e) => log::warn!("Dropping frame from {}: {e}", self.url),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                            .unwrap_or((ABNORMAL_CLOSE, String::new()));
                        return Exit::Closed { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Exit::Closed { code: ABNORMAL_CLOSE, reason: e.to_string() };
                    }
                    None => {
                        return Exit::Closed { code: ABNORMAL_CLOSE, reason: "stream ended".to_string() };
                    }
                },
            }
        }
    }
}
