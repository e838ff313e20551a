//! Session manager: owns the transport and the single active channel.

use crate::engine::{ChannelRole, SyncEngine};
use crate::render::RenderSurface;
use crate::transport::{ChannelId, ChannelOptions, Transport, TransportError, TransportEvent};
use thiserror::Error;

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
struct ActiveChannel {
    id: ChannelId,
    peer: String,
    role: ChannelRole,
}

/// Connects the transport to a [`SyncEngine`].
///
/// At most one channel is active. Events for any other channel (for example
/// a replaced one still winding down) are ignored.
pub struct SessionManager<T: Transport> {
    transport: T,
    local_id: Option<String>,
    active: Option<ActiveChannel>,
    status: String,
    auto_connect: Option<String>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            local_id: None,
            active: None,
            status: String::new(),
            auto_connect: None,
        }
    }

    /// Connect to `remote` as soon as the local identifier is known.
    pub fn with_auto_connect(mut self, remote: impl Into<String>) -> Self {
        self.auto_connect = Some(remote.into());
        self
    }

    /// Register with the transport. The identifier arrives later via [`Self::pump`].
    pub fn open(&mut self) -> Result<(), SessionError> {
        self.transport.open()?;
        self.status = "Waiting for ID...".to_string();
        Ok(())
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Human-readable connection status.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.peer.as_str())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open a reliable channel to `remote`, replacing any current one.
    ///
    /// An empty target or our own identifier is rejected before the
    /// transport is touched.
    pub fn connect<S: RenderSurface>(
        &mut self,
        remote: &str,
        engine: &mut SyncEngine<S>,
    ) -> Result<ChannelId, SessionError> {
        let remote = remote.trim();
        if remote.is_empty() {
            return Err(SessionError::InvalidTarget("peer id is empty".to_string()));
        }
        if self.local_id.as_deref() == Some(remote) {
            return Err(SessionError::InvalidTarget("cannot connect to yourself".to_string()));
        }

        if let Some(prior) = self.active.take() {
            log::info!("Replacing channel to {}", prior.peer);
            self.transport.close(prior.id);
        }

        engine.begin_connect(remote);
        match self.transport.connect(remote, ChannelOptions { reliable: true }) {
            Ok(id) => {
                self.active = Some(ActiveChannel {
                    id,
                    peer: remote.to_string(),
                    role: ChannelRole::Initiator,
                });
                self.status = format!("Connecting to: {remote}");
                Ok(id)
            }
            Err(e) => {
                engine.transport_error(&e.to_string());
                self.status = e.to_string();
                Err(e.into())
            }
        }
    }

    /// Close the active channel, if any.
    pub fn close<S: RenderSurface>(&mut self, engine: &mut SyncEngine<S>) {
        if let Some(active) = self.active.take() {
            self.transport.close(active.id);
            engine.channel_closed();
            self.status = "Connection closed".to_string();
        }
    }

    /// Run one turn: deliver every pending transport event to the engine,
    /// apply finished image decodes and send whatever the engine queued.
    ///
    /// Decodes are collected after every event, so a decoder that completes
    /// immediately keeps images in message order.
    ///
    /// Returns the number of transport events handled.
    pub fn pump<S: RenderSurface>(&mut self, engine: &mut SyncEngine<S>) -> usize {
        let events = self.transport.poll_events();
        let count = events.len();
        for event in events {
            self.handle_event(event, engine);
            engine.poll_decodes();
            self.flush(engine);
        }

        engine.poll_decodes();
        self.flush(engine);
        count
    }

    /// Send the engine's queued messages on the active channel.
    pub fn flush<S: RenderSurface>(&mut self, engine: &mut SyncEngine<S>) {
        let messages = engine.take_outgoing();
        if messages.is_empty() {
            return;
        }
        let Some(channel) = self.active.as_ref().map(|a| a.id) else {
            log::debug!("No active channel; dropping {} messages", messages.len());
            return;
        };

        for message in &messages {
            if let Err(e) = self.transport.send(channel, message) {
                log::warn!("Send failed on channel {}: {}", channel, e);
                if let Some(active) = self.active.take() {
                    self.transport.close(active.id);
                }
                self.fail(engine, &e.to_string());
                return;
            }
        }
    }

    fn is_active(&self, channel: ChannelId) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == channel)
    }

    fn fail<S: RenderSurface>(&mut self, engine: &mut SyncEngine<S>, message: &str) {
        engine.transport_error(message);
        self.status = message.to_string();
    }

    fn handle_event<S: RenderSurface>(&mut self, event: TransportEvent, engine: &mut SyncEngine<S>) {
        match event {
            TransportEvent::Ready { local_id } => {
                log::info!("Local id: {}", local_id);
                self.status = format!("Your ID: {local_id}");
                self.local_id = Some(local_id);
                if let Some(remote) = self.auto_connect.take() {
                    if let Err(e) = self.connect(&remote, engine) {
                        log::error!("Auto-connect to {} failed: {}", remote, e);
                    }
                }
            }
            TransportEvent::Incoming { channel, peer } => {
                if let Some(prior) = self.active.take() {
                    log::info!("Incoming channel from {} replaces {}", peer, prior.peer);
                    self.transport.close(prior.id);
                }
                engine.begin_connect(&peer);
                self.active = Some(ActiveChannel {
                    id: channel,
                    peer,
                    role: ChannelRole::Acceptor,
                });
            }
            TransportEvent::ChannelOpen { channel } => {
                let Some(active) = self.active.as_ref().filter(|a| a.id == channel) else {
                    log::debug!("Ignoring open of stale channel {}", channel);
                    return;
                };
                self.status = format!("Connected to: {}", active.peer);
                engine.channel_opened(active.role);
            }
            TransportEvent::ChannelData { channel, data } => {
                if self.is_active(channel) {
                    engine.handle_incoming(&data);
                } else {
                    log::debug!("Ignoring data on stale channel {}", channel);
                }
            }
            TransportEvent::ChannelClosed { channel } => {
                if self.is_active(channel) {
                    self.active = None;
                    engine.channel_closed();
                    self.status = "Connection closed".to_string();
                }
            }
            TransportEvent::Error { channel, message } => match channel {
                Some(channel) if !self.is_active(channel) => {
                    log::debug!("Ignoring error on stale channel {}: {}", channel, message);
                }
                Some(_) => {
                    self.active = None;
                    self.fail(engine, &message);
                }
                None => self.fail(engine, &message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::InlineDecoder;
    use crate::engine::ConnectionState;
    use crate::render::DisplayList;
    use crate::transport::{MemoryNetwork, MemoryTransport};

    fn engine() -> SyncEngine<DisplayList> {
        SyncEngine::with_decoder(DisplayList::default(), Box::new(InlineDecoder::new()))
    }

    fn session(network: &MemoryNetwork, id: &str) -> SessionManager<MemoryTransport> {
        let mut session = SessionManager::new(network.transport(id));
        session.open().unwrap();
        session
    }

    #[test]
    fn test_ready_sets_local_id_and_status() {
        let network = MemoryNetwork::new();
        let mut session = session(&network, "alice");
        let mut engine = engine();
        assert_eq!(session.local_id(), None);

        session.pump(&mut engine);
        assert_eq!(session.local_id(), Some("alice"));
        assert_eq!(session.status(), "Your ID: alice");
    }

    #[test]
    fn test_empty_target_rejected_without_transport_call() {
        let network = MemoryNetwork::new();
        let mut session = session(&network, "alice");
        let mut engine = engine();
        session.pump(&mut engine);

        assert!(matches!(session.connect("", &mut engine), Err(SessionError::InvalidTarget(_))));
        assert!(matches!(session.connect("   ", &mut engine), Err(SessionError::InvalidTarget(_))));
        assert_eq!(session.transport().connect_attempts(), 0);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_self_target_rejected() {
        let network = MemoryNetwork::new();
        let mut session = session(&network, "alice");
        let mut engine = engine();
        session.pump(&mut engine);

        assert!(matches!(session.connect("alice", &mut engine), Err(SessionError::InvalidTarget(_))));
        assert_eq!(session.transport().connect_attempts(), 0);
    }

    #[test]
    fn test_connect_before_ready_is_transport_error() {
        let network = MemoryNetwork::new();
        let mut session = SessionManager::new(network.transport("alice"));
        let mut engine = engine();
        assert_eq!(
            session.connect("bob", &mut engine),
            Err(SessionError::Transport(TransportError::NotReady))
        );
        assert_eq!(engine.state(), ConnectionState::Errored);
    }

    #[test]
    fn test_unknown_peer_errors_then_reconnects() {
        let network = MemoryNetwork::new();
        let mut alice = session(&network, "alice");
        let mut bob = session(&network, "bob");
        let mut alice_engine = engine();
        let mut bob_engine = engine();
        alice.pump(&mut alice_engine);
        bob.pump(&mut bob_engine);

        alice.connect("carol", &mut alice_engine).unwrap();
        alice.pump(&mut alice_engine);
        assert_eq!(alice_engine.state(), ConnectionState::Errored);
        assert!(alice.status().contains("carol"));

        alice.connect("bob", &mut alice_engine).unwrap();
        alice.pump(&mut alice_engine);
        bob.pump(&mut bob_engine);
        assert!(alice_engine.is_open());
        assert!(bob_engine.is_open());
        assert_eq!(alice.status(), "Connected to: bob");
        assert_eq!(bob.status(), "Connected to: alice");
        assert_eq!(bob.active_peer(), Some("alice"));
    }

    #[test]
    fn test_auto_connect_after_ready() {
        let network = MemoryNetwork::new();
        let mut bob = session(&network, "bob");
        let mut bob_engine = engine();
        bob.pump(&mut bob_engine);

        let mut alice = SessionManager::new(network.transport("alice")).with_auto_connect("bob");
        alice.open().unwrap();
        let mut alice_engine = engine();
        alice.pump(&mut alice_engine);
        alice.pump(&mut alice_engine);

        assert_eq!(alice.active_peer(), Some("bob"));
        assert!(alice_engine.is_open());
    }

    #[test]
    fn test_stale_channel_events_ignored_after_replace() {
        let network = MemoryNetwork::new();
        let mut alice = session(&network, "alice");
        let mut bob = session(&network, "bob");
        let mut carol = session(&network, "carol");
        let (mut ae, mut be, mut ce) = (engine(), engine(), engine());
        alice.pump(&mut ae);
        bob.pump(&mut be);
        carol.pump(&mut ce);

        alice.connect("bob", &mut ae).unwrap();
        alice.connect("carol", &mut ae).unwrap();
        alice.pump(&mut ae);

        assert_eq!(alice.active_peer(), Some("carol"));
        assert!(ae.is_open());
        assert_eq!(ae.peer(), Some("carol"));
    }

    #[test]
    fn test_close_notifies_peer() {
        let network = MemoryNetwork::new();
        let mut alice = session(&network, "alice");
        let mut bob = session(&network, "bob");
        let (mut ae, mut be) = (engine(), engine());
        alice.pump(&mut ae);
        bob.pump(&mut be);
        alice.connect("bob", &mut ae).unwrap();
        alice.pump(&mut ae);
        bob.pump(&mut be);

        alice.close(&mut ae);
        assert_eq!(ae.state(), ConnectionState::Closed);
        assert_eq!(alice.status(), "Connection closed");

        bob.pump(&mut be);
        assert_eq!(be.state(), ConnectionState::Closed);
        assert_eq!(bob.active_peer(), None);
    }

    #[test]
    fn test_send_failure_drops_active_channel() {
        let network = MemoryNetwork::new();
        let mut alice = session(&network, "alice");
        let mut bob = session(&network, "bob");
        let (mut ae, mut be) = (engine(), engine());
        alice.pump(&mut ae);
        bob.pump(&mut be);
        alice.connect("bob", &mut ae).unwrap();
        alice.pump(&mut ae);
        assert!(ae.is_open());

        // Bob vanishes before Alice hears about it
        drop(bob);
        ae.clear_scene();
        alice.flush(&mut ae);

        assert_eq!(ae.state(), ConnectionState::Errored);
        assert_eq!(alice.active_peer(), None);
        assert_eq!(alice.status(), "unknown channel 1");

        // The late close notice is for a channel we already let go
        alice.pump(&mut ae);
        assert_eq!(ae.state(), ConnectionState::Errored);
        ae.clear_scene();
        alice.flush(&mut ae);
        assert!(!ae.has_outgoing());
        assert_eq!(alice.active_peer(), None);
    }

    #[test]
    fn test_broker_wide_error_marks_errored() {
        let network = MemoryNetwork::new();
        let mut alice = session(&network, "alice");
        let mut ae = engine();
        alice.pump(&mut ae);

        network.inject(
            "alice",
            TransportEvent::Error {
                channel: None,
                message: "Lost connection to server".to_string(),
            },
        );
        alice.pump(&mut ae);
        assert_eq!(ae.state(), ConnectionState::Errored);
        assert_eq!(alice.status(), "Lost connection to server");
    }
}
