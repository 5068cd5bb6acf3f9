//! WebSocket relay server with per-project rooms.
//!
//! ```text
//! Client A ──┐  GET /projects/{id}/ws
//!            │  Sec-WebSocket-Protocol: jwt.<token>
//!            ├── handshake ── TokenVerifier ── Room ({id}) ── BroadcastGroup
//! Client B ──┘                                                    │
//!                                                    ┌────────────┼────────────┐
//!                                                    ▼            ▼            ▼
//!                                                 Client A     Client B     Client C
//!                                                (skipped)
//! ```
//!
//! The relay keeps no document state. Every text frame a peer sends is
//! forwarded verbatim to the other peers of its room; each client applies
//! patches to its own copy.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::RoomManager;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum peers per room
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

impl ServerConfig {
    pub fn for_testing(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            max_peers_per_room: 8,
            broadcast_capacity: 64,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub relayed_frames: u64,
    pub active_rooms: usize,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

// ─── Credentials ────────────────────────────────────────────────

/// Decides whether a credential may join a project's room.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, project_id: &str, token: &str) -> bool;
}

/// Accepts any non-empty token.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyToken;

impl TokenVerifier for AcceptAnyToken {
    fn verify(&self, _project_id: &str, token: &str) -> bool {
        !token.is_empty()
    }
}

/// Accepts only the listed tokens, for every project.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashSet<String>,
}

impl StaticTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl TokenVerifier for StaticTokens {
    fn verify(&self, _project_id: &str, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

impl<F> TokenVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    fn verify(&self, project_id: &str, token: &str) -> bool {
        self(project_id, token)
    }
}

// ─── Handshake ──────────────────────────────────────────────────

/// Project id from `/projects/{id}/ws`.
fn project_from_path(path: &str) -> Option<&str> {
    let id = path.strip_prefix("/projects/")?.strip_suffix("/ws")?;
    (!id.is_empty() && !id.contains('/')).then_some(id)
}

/// First `jwt.<token>` entry among the offered sub-protocols.
fn offered_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find_map(|protocol| protocol.strip_prefix("jwt."))
        .map(str::to_owned)
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Validate an upgrade request. On success the response echoes the
/// accepted sub-protocol and the project id is returned alongside it.
fn admit(
    request: &Request,
    mut response: Response,
    verifier: &dyn TokenVerifier,
) -> Result<(Response, String), ErrorResponse> {
    let Some(project_id) = project_from_path(request.uri().path()) else {
        return Err(reject(StatusCode::NOT_FOUND, "Unknown endpoint"));
    };
    let token = offered_token(request).unwrap_or_default();
    if !verifier.verify(project_id, &token) {
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid or missing token"));
    }
    let protocol = HeaderValue::from_str(&format!("jwt.{token}"))
        .map_err(|_| reject(StatusCode::BAD_REQUEST, "Malformed sub-protocol"))?;
    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    Ok((response, project_id.to_owned()))
}

// ─── Server ─────────────────────────────────────────────────────

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    verifier: Arc<dyn TokenVerifier>,
    stats: Arc<RwLock<ServerStats>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, verifier: impl TokenVerifier) -> Self {
        let rooms = Arc::new(RoomManager::new(
            config.broadcast_capacity,
            config.max_peers_per_room,
        ));
        Self {
            config,
            rooms,
            verifier: Arc::new(verifier),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Default configuration, accepting any non-empty token.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default(), AcceptAnyToken)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Bind `config.bind_addr` and serve until the task is cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })?;
        log::info!("Relay server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let verifier = self.verifier.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, rooms, verifier, stats).await {
                    log::debug!("Connection from {addr} ended with error: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomManager>,
        verifier: Arc<dyn TokenVerifier>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), ServerError> {
        let mut admitted: Option<String> = None;
        let handshake = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, response: Response| {
                let (response, project_id) = admit(request, response, verifier.as_ref())?;
                admitted = Some(project_id);
                Ok(response)
            },
        )
        .await;

        let (ws_stream, project_id) = match (handshake, admitted) {
            (Ok(ws_stream), Some(project_id)) => (ws_stream, project_id),
            (result, _) => {
                stats.write().await.rejected_connections += 1;
                log::info!("Rejected upgrade from {addr}");
                return result.map(|_| ()).map_err(ServerError::from);
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let peer_id = Uuid::new_v4();

        let Some((room, mut broadcast_rx)) = rooms.join(&project_id, peer_id).await else {
            log::warn!("Room {project_id} is full, turning away {addr}");
            stats.write().await.rejected_connections += 1;
            let frame = CloseFrame {
                code: CloseCode::Again,
                reason: "Room is full".into(),
            };
            ws_sender.send(Message::Close(Some(frame))).await?;
            return Ok(());
        };

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
            s.active_rooms = rooms.room_count().await;
        }
        log::info!("Peer {peer_id} ({addr}) joined project {project_id}");

        let result = loop {
            tokio::select! {
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let receivers = room.broadcast(peer_id, text.as_str());
                        log::trace!("Relayed {} bytes from {peer_id} to {} receivers", text.len(), receivers.saturating_sub(1));
                        stats.write().await.relayed_frames += 1;
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(Message::Binary(_))) => {
                        log::debug!("Ignoring binary frame from {peer_id}");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(ServerError::from(e)),
                },

                frame = broadcast_rx.recv() => match frame {
                    Ok(frame) if frame.sender == peer_id => {}
                    Ok(frame) => {
                        if let Err(e) = ws_sender.send(Message::text(frame.text.to_string())).await {
                            break Err(ServerError::from(e));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Peer {peer_id} lagged, {skipped} frames skipped");
                        room.record_lag(skipped);
                    }
                    Err(RecvError::Closed) => break Ok(()),
                },
            }
        };

        let dropped = rooms.leave(&project_id, &peer_id).await;
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = rooms.room_count().await;
        }
        if dropped {
            log::info!("Room {project_id} closed, last peer left");
        }
        log::info!("Peer {peer_id} left project {project_id}");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    fn request(path: &str, protocol: Option<&str>) -> Request {
        let mut request = format!("ws://localhost{path}").into_client_request().unwrap();
        if let Some(protocol) = protocol {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(protocol).unwrap());
        }
        request
    }

    #[test]
    fn test_project_from_path() {
        assert_eq!(project_from_path("/projects/abc/ws"), Some("abc"));
        assert_eq!(project_from_path("/projects//ws"), None);
        assert_eq!(project_from_path("/projects/a/b/ws"), None);
        assert_eq!(project_from_path("/ws"), None);
    }

    #[test]
    fn test_admit_echoes_protocol() {
        let req = request("/projects/p1/ws", Some("jwt.secret"));
        let (response, project) = admit(&req, Response::new(()), &AcceptAnyToken).unwrap();
        assert_eq!(project, "p1");
        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "jwt.secret"
        );
    }

    #[test]
    fn test_admit_rejections() {
        let unknown = request("/other", Some("jwt.secret"));
        let err = admit(&unknown, Response::new(()), &AcceptAnyToken).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let missing = request("/projects/p1/ws", None);
        let err = admit(&missing, Response::new(()), &AcceptAnyToken).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let wrong = request("/projects/p1/ws", Some("jwt.guess"));
        let err = admit(&wrong, Response::new(()), &StaticTokens::new(["secret"])).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_closure_verifier() {
        let verifier = |project: &str, token: &str| project == "p1" && token == "t";
        let req = request("/projects/p1/ws", Some("chat, jwt.t"));
        assert!(admit(&req, Response::new(()), &verifier).is_ok());
        let req = request("/projects/p2/ws", Some("jwt.t"));
        assert!(admit(&req, Response::new(()), &verifier).is_err());
    }

    #[test]
    fn test_default_config() {
        let server = RelayServer::with_defaults();
        assert_eq!(server.config().bind_addr, "127.0.0.1:9090");
        assert_eq!(server.config().max_peers_per_room, 100);
    }
}
