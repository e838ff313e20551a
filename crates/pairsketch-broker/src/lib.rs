//! PairSketch signaling and relay broker.
//!
//! Every WebSocket connection is a peer with a broker-assigned identifier.
//! Peers link 1:1 by identifier and the broker relays text payloads across
//! each link, in order.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "connect", "target": "3f2a9c1e" }
//! { "type": "relay", "to": "3f2a9c1e", "payload": "{\"type\":\"clear\"}" }
//! { "type": "close", "peer": "3f2a9c1e" }
//! ```
//! and the broker answers with `opened`, `incoming`, `linked`, `data`,
//! `closed` and `error` messages.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Length of generated peer identifiers.
const PEER_ID_LEN: usize = 8;

/// A message sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Link with another peer
    Connect { target: String },
    /// Forward a payload to the linked peer
    Relay { to: String, payload: String },
    /// Tear down the link
    Close { peer: String },
}

/// A message sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identifier assigned to this connection
    Opened { id: String },
    /// Another peer is linking with this one
    Incoming { from: String },
    /// Link established
    Linked { peer: String },
    /// Payload relayed from the linked peer
    Data { from: String, payload: String },
    /// Link torn down by the other side
    Closed { peer: String },
    /// Error message
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<String>,
        message: String,
    },
}

/// Broker errors, reported back to the requesting peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Could not connect to peer {0}")]
    UnknownPeer(String),
    #[error("Cannot connect to yourself")]
    SelfLink,
    #[error("Not linked with peer {0}")]
    NotLinked(String),
}

impl BrokerError {
    /// The peer the error concerns, if any.
    pub fn peer(&self) -> Option<String> {
        match self {
            BrokerError::UnknownPeer(peer) | BrokerError::NotLinked(peer) => Some(peer.clone()),
            BrokerError::SelfLink => None,
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            peer: self.peer(),
            message: self.to_string(),
        }
    }
}

/// Connected peer
struct Peer {
    /// Outbound queue for this peer's socket
    tx: mpsc::UnboundedSender<ServerMessage>,
    /// Peer this one is linked with
    link: Option<String>,
}

/// Shared broker state
#[derive(Default)]
pub struct BrokerState {
    peers: DashMap<String, Peer>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under a fresh identifier.
    pub fn register(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> String {
        loop {
            let id: String = Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(PEER_ID_LEN)
                .collect();
            if self.register_as(&id, tx.clone()) {
                return id;
            }
        }
    }

    /// Register under a chosen identifier. Fails if it is taken.
    pub fn register_as(&self, id: &str, tx: mpsc::UnboundedSender<ServerMessage>) -> bool {
        match self.peers.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Peer { tx, link: None });
                true
            }
        }
    }

    /// Drop a connection, closing its link.
    pub fn unregister(&self, id: &str) {
        if let Some((_, peer)) = self.peers.remove(id) {
            if let Some(partner) = peer.link {
                self.unlink_one(&partner, id);
                self.send(&partner, ServerMessage::Closed { peer: id.to_string() });
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Current link of `id`.
    pub fn link_of(&self, id: &str) -> Option<String> {
        self.peers.get(id).and_then(|peer| peer.link.clone())
    }

    /// Link `from` with `target`, replacing any previous link of either.
    pub fn connect(&self, from: &str, target: &str) -> Result<(), BrokerError> {
        if from == target {
            return Err(BrokerError::SelfLink);
        }
        if !self.peers.contains_key(target) {
            return Err(BrokerError::UnknownPeer(target.to_string()));
        }

        self.drop_link(from);
        self.drop_link(target);

        self.set_link(from, target);
        self.set_link(target, from);

        self.send(target, ServerMessage::Incoming { from: from.to_string() });
        self.send(target, ServerMessage::Linked { peer: from.to_string() });
        self.send(from, ServerMessage::Linked { peer: target.to_string() });
        info!("Linked {} -> {}", from, target);
        Ok(())
    }

    /// Relay a payload across an existing link.
    pub fn relay(&self, from: &str, to: &str, payload: String) -> Result<(), BrokerError> {
        if self.link_of(from).as_deref() != Some(to) {
            return Err(BrokerError::NotLinked(to.to_string()));
        }
        self.send(
            to,
            ServerMessage::Data {
                from: from.to_string(),
                payload,
            },
        );
        Ok(())
    }

    /// Close the link between `from` and `peer`, notifying `peer`.
    pub fn close(&self, from: &str, peer: &str) {
        if self.link_of(from).as_deref() != Some(peer) {
            debug!("Ignoring close of missing link {} -> {}", from, peer);
            return;
        }
        self.unlink_one(from, peer);
        self.unlink_one(peer, from);
        self.send(peer, ServerMessage::Closed { peer: from.to_string() });
        info!("Closed link {} -> {}", from, peer);
    }

    /// Queue a message for a peer. Unknown peers are ignored.
    pub fn send(&self, id: &str, message: ServerMessage) {
        if let Some(peer) = self.peers.get(id) {
            let _ = peer.tx.send(message);
        }
    }

    fn set_link(&self, id: &str, partner: &str) {
        if let Some(mut peer) = self.peers.get_mut(id) {
            peer.link = Some(partner.to_string());
        }
    }

    /// Clear `id`'s link if it points at `partner`.
    fn unlink_one(&self, id: &str, partner: &str) {
        if let Some(mut peer) = self.peers.get_mut(id) {
            if peer.link.as_deref() == Some(partner) {
                peer.link = None;
            }
        }
    }

    /// Tear down whatever link `id` has, telling the old partner.
    fn drop_link(&self, id: &str) {
        let Some(old) = self.link_of(id) else {
            return;
        };
        self.unlink_one(id, &old);
        self.unlink_one(&old, id);
        self.send(&old, ServerMessage::Closed { peer: id.to_string() });
    }

    /// Apply one client request.
    pub fn handle(&self, from: &str, message: ClientMessage) -> Result<(), BrokerError> {
        match message {
            ClientMessage::Connect { target } => self.connect(from, target.trim()),
            ClientMessage::Relay { to, payload } => self.relay(from, &to, payload),
            ClientMessage::Close { peer } => {
                self.close(from, &peer);
                Ok(())
            }
        }
    }
}

/// Build the broker's HTTP router.
pub fn router(state: Arc<BrokerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "PairSketch Broker - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BrokerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let peer_id = state.register(tx);
    info!("New connection: {}", peer_id);
    state.send(&peer_id, ServerMessage::Opened { id: peer_id.clone() });

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(request) => {
                                if let Err(e) = state.handle(&peer_id, request) {
                                    warn!("Request from {} failed: {}", peer_id, e);
                                    state.send(&peer_id, e.to_message());
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                state.send(&peer_id, ServerMessage::Error {
                                    peer: None,
                                    message: format!("Invalid message: {}", e),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Forward queued messages to the client
            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    break;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode message for {}: {}", peer_id, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.unregister(&peer_id);
    info!("Connection closed: {}", peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(state: &BrokerState, id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(state.register_as(id, tx));
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"connect","target":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Connect { target: "abc".to_string() });

        let json = serde_json::to_string(&ServerMessage::Closed { peer: "x".to_string() }).unwrap();
        assert_eq!(json, r#"{"type":"closed","peer":"x"}"#);
    }

    #[test]
    fn test_register_generates_short_unique_ids() {
        let state = BrokerState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = state.register(tx.clone());
        let b = state.register(tx);
        assert_eq!(a.len(), PEER_ID_LEN);
        assert_ne!(a, b);
        assert_eq!(state.peer_count(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let state = BrokerState::new();
        let _rx = peer(&state, "a");
        let (tx, _rx2) = mpsc::unbounded_channel();
        assert!(!state.register_as("a", tx));
    }

    #[test]
    fn test_connect_links_both_sides() {
        let state = BrokerState::new();
        let mut a = peer(&state, "a");
        let mut b = peer(&state, "b");

        state.connect("a", "b").unwrap();
        assert_eq!(drain(&mut a), vec![ServerMessage::Linked { peer: "b".to_string() }]);
        assert_eq!(
            drain(&mut b),
            vec![
                ServerMessage::Incoming { from: "a".to_string() },
                ServerMessage::Linked { peer: "a".to_string() },
            ]
        );
        assert_eq!(state.link_of("a").as_deref(), Some("b"));
        assert_eq!(state.link_of("b").as_deref(), Some("a"));
    }

    #[test]
    fn test_connect_errors() {
        let state = BrokerState::new();
        let _a = peer(&state, "a");
        assert_eq!(state.connect("a", "a"), Err(BrokerError::SelfLink));
        assert_eq!(
            state.connect("a", "ghost"),
            Err(BrokerError::UnknownPeer("ghost".to_string()))
        );
        assert_eq!(
            BrokerError::UnknownPeer("ghost".to_string()).to_message(),
            ServerMessage::Error {
                peer: Some("ghost".to_string()),
                message: "Could not connect to peer ghost".to_string(),
            }
        );
    }

    #[test]
    fn test_relay_requires_link() {
        let state = BrokerState::new();
        let _a = peer(&state, "a");
        let mut b = peer(&state, "b");

        assert_eq!(
            state.relay("a", "b", "x".to_string()),
            Err(BrokerError::NotLinked("b".to_string()))
        );

        state.connect("a", "b").unwrap();
        drain(&mut b);
        state.relay("a", "b", "payload".to_string()).unwrap();
        assert_eq!(
            drain(&mut b),
            vec![ServerMessage::Data {
                from: "a".to_string(),
                payload: "payload".to_string()
            }]
        );
    }

    #[test]
    fn test_new_link_replaces_old_one() {
        let state = BrokerState::new();
        let mut a = peer(&state, "a");
        let mut b = peer(&state, "b");
        let _c = peer(&state, "c");

        state.connect("a", "b").unwrap();
        drain(&mut a);
        drain(&mut b);

        state.connect("a", "c").unwrap();
        assert_eq!(drain(&mut b), vec![ServerMessage::Closed { peer: "a".to_string() }]);
        assert_eq!(state.link_of("b"), None);
        assert_eq!(state.link_of("a").as_deref(), Some("c"));
    }

    #[test]
    fn test_close_and_unregister_notify_partner() {
        let state = BrokerState::new();
        let _a = peer(&state, "a");
        let mut b = peer(&state, "b");

        state.connect("a", "b").unwrap();
        drain(&mut b);
        state.close("a", "b");
        assert_eq!(drain(&mut b), vec![ServerMessage::Closed { peer: "a".to_string() }]);
        assert_eq!(state.link_of("a"), None);

        state.connect("a", "b").unwrap();
        drain(&mut b);
        state.unregister("a");
        assert_eq!(drain(&mut b), vec![ServerMessage::Closed { peer: "a".to_string() }]);
        assert_eq!(state.link_of("b"), None);
        assert_eq!(state.peer_count(), 1);
    }
}
