//! WebSocket transport to the pairsketch broker.
//!
//! The broker assigns identifiers and relays messages between linked peers.
//! Socket I/O runs on a background thread; events are collected through a
//! channel and must be polled via [`Transport::poll_events`].

use super::{ChannelId, ChannelOptions, Transport, TransportError, TransportEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Messages sent to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerRequest {
    /// Link with another peer.
    Connect { target: String },
    /// Forward a payload to a linked peer.
    Relay { to: String, payload: String },
    /// Tear down the link with a peer.
    Close { peer: String },
}

/// Messages received from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// Registration complete.
    Opened { id: String },
    /// A peer is linking with us.
    Incoming { from: String },
    /// The link with a peer is established.
    Linked { peer: String },
    /// Payload relayed from a linked peer.
    Data { from: String, payload: String },
    /// A link went away.
    Closed { peer: String },
    /// Error message
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<String>,
        message: String,
    },
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// What the WebSocket thread reports back.
enum WsEvent {
    Broker(BrokerEvent),
    Disconnected,
    Failed(String),
}

#[derive(Debug)]
struct ChannelEntry {
    peer: String,
    open: bool,
}

/// Broker-backed transport for native platforms.
pub struct NativeTransport {
    url: String,
    local_id: Option<String>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<WsEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
    channels: HashMap<ChannelId, ChannelEntry>,
    next_channel: ChannelId,
    pending: Vec<TransportEvent>,
}

impl NativeTransport {
    /// Create a transport for the broker at `url`. Nothing happens until
    /// [`Transport::open`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            local_id: None,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
            channels: HashMap::new(),
            next_channel: 0,
            pending: Vec::new(),
        }
    }

    /// Identifier assigned by the broker, once registered.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Check if the socket thread is running.
    pub fn is_connected(&self) -> bool {
        self.cmd_tx.is_some()
    }

    /// Drop the broker connection and every channel.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.local_id = None;
        self.channels.clear();
    }

    fn request(&self, request: &BrokerRequest) -> Result<(), TransportError> {
        let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotReady)?;
        let text = serde_json::to_string(request).map_err(|e| TransportError::Send(e.to_string()))?;
        tx.send(WsCommand::Send(text))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn allocate_channel(&mut self, peer: &str, open: bool) -> ChannelId {
        self.next_channel += 1;
        self.channels.insert(
            self.next_channel,
            ChannelEntry {
                peer: peer.to_string(),
                open,
            },
        );
        self.next_channel
    }

    fn channel_for(&self, peer: &str) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|(_, entry)| entry.peer == peer)
            .map(|(id, _)| *id)
    }

    /// Map one broker message onto channel-level events.
    fn translate(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Opened { id } => {
                log::info!("Registered with broker as {}", id);
                self.local_id = Some(id.clone());
                self.pending.push(TransportEvent::Ready { local_id: id });
            }
            BrokerEvent::Incoming { from } => {
                let channel = self.allocate_channel(&from, false);
                self.pending.push(TransportEvent::Incoming { channel, peer: from });
            }
            BrokerEvent::Linked { peer } => {
                let channel = match self.channel_for(&peer) {
                    Some(channel) => channel,
                    None => self.allocate_channel(&peer, false),
                };
                if let Some(entry) = self.channels.get_mut(&channel) {
                    entry.open = true;
                }
                self.pending.push(TransportEvent::ChannelOpen { channel });
            }
            BrokerEvent::Data { from, payload } => match self.channel_for(&from) {
                Some(channel) => self.pending.push(TransportEvent::ChannelData { channel, data: payload }),
                None => log::warn!("Dropping data from unlinked peer {}", from),
            },
            BrokerEvent::Closed { peer } => {
                if let Some(channel) = self.channel_for(&peer) {
                    self.channels.remove(&channel);
                    self.pending.push(TransportEvent::ChannelClosed { channel });
                }
            }
            BrokerEvent::Error { peer, message } => {
                // A peer-scoped error ends that link, e.g. an unknown connect target
                let channel = peer.as_deref().and_then(|p| self.channel_for(p));
                if let Some(channel) = channel {
                    self.channels.remove(&channel);
                }
                self.pending.push(TransportEvent::Error { channel, message });
            }
        }
    }

    fn lose_connection(&mut self, message: String) {
        let channels: Vec<_> = self.channels.drain().map(|(id, _)| id).collect();
        for channel in channels {
            self.pending.push(TransportEvent::ChannelClosed { channel });
        }
        self.pending.push(TransportEvent::Error { channel: None, message });
        self.cmd_tx = None;
        self.event_rx = None;
        self._thread = None;
        self.local_id = None;
    }
}

impl Transport for NativeTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.cmd_tx.is_some() {
            return Ok(());
        }

        // Validate URL
        let parsed_url = Url::parse(&self.url).map_err(|e| TransportError::Connection(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(TransportError::Connection(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<WsEvent>();
        let url = self.url.clone();

        let handle = thread::spawn(move || run_socket(url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn connect(&mut self, remote: &str, options: ChannelOptions) -> Result<ChannelId, TransportError> {
        if self.local_id.is_none() {
            return Err(TransportError::NotReady);
        }
        if !options.reliable {
            log::warn!("Broker links are always reliable; ignoring unreliable request");
        }

        if let Some(stale) = self.channel_for(remote) {
            self.channels.remove(&stale);
        }
        self.request(&BrokerRequest::Connect {
            target: remote.to_string(),
        })?;
        Ok(self.allocate_channel(remote, false))
    }

    fn send(&mut self, channel: ChannelId, data: &str) -> Result<(), TransportError> {
        let entry = self
            .channels
            .get(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;
        if !entry.open {
            return Err(TransportError::ChannelNotOpen(channel));
        }
        self.request(&BrokerRequest::Relay {
            to: entry.peer.clone(),
            payload: data.to_string(),
        })
    }

    fn close(&mut self, channel: ChannelId) {
        let Some(entry) = self.channels.remove(&channel) else {
            return;
        };
        if let Err(e) = self.request(&BrokerRequest::Close { peer: entry.peer }) {
            log::debug!("Close request not delivered: {}", e);
        }
        self.pending.push(TransportEvent::ChannelClosed { channel });
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut received = Vec::new();
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                received.push(event);
            }
        }

        for event in received {
            match event {
                WsEvent::Broker(event) => self.translate(event),
                WsEvent::Disconnected => self.lose_connection("Connection to broker lost".to_string()),
                WsEvent::Failed(message) => self.lose_connection(message),
            }
        }

        std::mem::take(&mut self.pending)
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Socket loop: forward commands out, broker messages in.
fn run_socket(url: String, cmd_rx: Receiver<WsCommand>, event_tx: Sender<WsEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url.as_str()) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(WsEvent::Failed(format!("Connection failed: {}", e)));
            return;
        }
    };
    log::info!("WebSocket connected, status: {}", response.status());

    // Short read timeout keeps the loop responsive to outgoing commands
    match socket.get_mut() {
        tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("TLS or other stream - using default timeout handling"),
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", msg.chars().take(100).collect::<String>());
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                return;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<BrokerEvent>(&txt) {
                Ok(event) => {
                    if event_tx.send(WsEvent::Broker(event)).is_err() {
                        return;
                    }
                }
                Err(e) => log::warn!("Failed to parse broker message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(WsEvent::Disconnected);
}
