//! Peer channel transport.
//!
//! A transport hands out a local identifier, opens reliable ordered text
//! channels to remote identifiers and reports everything that happens as
//! [`TransportEvent`]s, collected by polling.

mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;

pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeTransport;

use thiserror::Error;

/// Handle of one channel, unique within a transport.
pub type ChannelId = u64;

/// Channel negotiation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Ordered, loss-free delivery.
    pub reliable: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self { reliable: true }
    }
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport registered and received its identifier.
    Ready { local_id: String },
    /// A remote peer opened a channel to us.
    Incoming { channel: ChannelId, peer: String },
    /// A channel finished negotiating and can carry data.
    ChannelOpen { channel: ChannelId },
    /// One text message arrived on a channel.
    ChannelData { channel: ChannelId, data: String },
    /// A channel was closed by either side.
    ChannelClosed { channel: ChannelId },
    /// A failure, scoped to a channel when one is known.
    Error {
        channel: Option<ChannelId>,
        message: String,
    },
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport has no local identifier yet")]
    NotReady,
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("channel {0} is not open")]
    ChannelNotOpen(ChannelId),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// A source of peer channels.
pub trait Transport {
    /// Start registering. Completion is reported as [`TransportEvent::Ready`].
    fn open(&mut self) -> Result<(), TransportError>;

    /// Request a channel to `remote`. Completion is reported as
    /// [`TransportEvent::ChannelOpen`] or [`TransportEvent::Error`].
    fn connect(&mut self, remote: &str, options: ChannelOptions) -> Result<ChannelId, TransportError>;

    /// Send one text message on an open channel.
    fn send(&mut self, channel: ChannelId, data: &str) -> Result<(), TransportError>;

    /// Close a channel. Closing an unknown channel is a no-op.
    fn close(&mut self, channel: ChannelId);

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}
