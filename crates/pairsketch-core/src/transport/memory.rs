//! In-process transport.

use super::{ChannelId, ChannelOptions, Transport, TransportError, TransportEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct Link {
    remote: String,
    remote_channel: ChannelId,
}

#[derive(Debug, Default)]
struct Hub {
    /// Pending events per registered identifier.
    queues: HashMap<String, VecDeque<TransportEvent>>,
    /// Channel endpoints, keyed by owner identifier and local channel.
    links: HashMap<(String, ChannelId), Link>,
    next_channel: ChannelId,
}

impl Hub {
    fn push(&mut self, id: &str, event: TransportEvent) {
        if let Some(queue) = self.queues.get_mut(id) {
            queue.push_back(event);
        }
    }

    fn allocate_channel(&mut self) -> ChannelId {
        self.next_channel += 1;
        self.next_channel
    }
}

/// A shared in-memory broker for testing and ephemeral use.
///
/// Every [`MemoryTransport`] created from the same network can reach the
/// others by identifier. Delivery is immediate and ordered; events are held
/// until the receiving transport polls.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that will register as `id` when opened.
    pub fn transport(&self, id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            id: id.into(),
            registered: false,
            connect_attempts: 0,
        }
    }

    /// Queue an arbitrary event for a registered identifier.
    ///
    /// Lets tests simulate failures the in-memory broker never produces.
    pub fn inject(&self, id: &str, event: TransportEvent) {
        self.lock().push(id, event);
    }

    /// Whether `id` is currently registered.
    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().queues.contains_key(id)
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One endpoint of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    id: String,
    registered: bool,
    connect_attempts: usize,
}

impl MemoryTransport {
    /// Identifier this transport registers under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// How many times [`Transport::connect`] was called.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        if self.registered {
            return Ok(());
        }
        if hub.queues.contains_key(&self.id) {
            return Err(TransportError::Connection(format!("id {} is already taken", self.id)));
        }

        hub.queues.insert(self.id.clone(), VecDeque::new());
        hub.push(
            &self.id,
            TransportEvent::Ready {
                local_id: self.id.clone(),
            },
        );
        self.registered = true;
        log::debug!("Memory transport registered as {}", self.id);
        Ok(())
    }

    fn connect(&mut self, remote: &str, options: ChannelOptions) -> Result<ChannelId, TransportError> {
        if !self.registered {
            return Err(TransportError::NotReady);
        }
        self.connect_attempts += 1;
        if !options.reliable {
            log::warn!("Memory transport is always reliable; ignoring unreliable request");
        }

        let mut hub = self.network.lock();
        let channel = hub.allocate_channel();

        if !hub.queues.contains_key(remote) {
            hub.push(
                &self.id,
                TransportEvent::Error {
                    channel: Some(channel),
                    message: format!("Could not connect to peer {remote}"),
                },
            );
            return Ok(channel);
        }

        let remote_channel = hub.allocate_channel();
        hub.links.insert(
            (self.id.clone(), channel),
            Link {
                remote: remote.to_string(),
                remote_channel,
            },
        );
        hub.links.insert(
            (remote.to_string(), remote_channel),
            Link {
                remote: self.id.clone(),
                remote_channel: channel,
            },
        );

        hub.push(
            remote,
            TransportEvent::Incoming {
                channel: remote_channel,
                peer: self.id.clone(),
            },
        );
        hub.push(remote, TransportEvent::ChannelOpen { channel: remote_channel });
        hub.push(&self.id, TransportEvent::ChannelOpen { channel });

        Ok(channel)
    }

    fn send(&mut self, channel: ChannelId, data: &str) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        let link = hub
            .links
            .get(&(self.id.clone(), channel))
            .cloned()
            .ok_or(TransportError::UnknownChannel(channel))?;

        hub.push(
            &link.remote,
            TransportEvent::ChannelData {
                channel: link.remote_channel,
                data: data.to_string(),
            },
        );
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        let mut hub = self.network.lock();
        let Some(link) = hub.links.remove(&(self.id.clone(), channel)) else {
            return;
        };
        hub.links.remove(&(link.remote.clone(), link.remote_channel));

        hub.push(
            &link.remote,
            TransportEvent::ChannelClosed {
                channel: link.remote_channel,
            },
        );
        hub.push(&self.id, TransportEvent::ChannelClosed { channel });
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut hub = self.network.lock();
        hub.queues
            .get_mut(&self.id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        let mut hub = self.network.lock();
        hub.queues.remove(&self.id);

        let owned: Vec<_> = hub
            .links
            .keys()
            .filter(|(owner, _)| *owner == self.id)
            .cloned()
            .collect();
        for key in owned {
            if let Some(link) = hub.links.remove(&key) {
                hub.links.remove(&(link.remote.clone(), link.remote_channel));
                hub.push(
                    &link.remote,
                    TransportEvent::ChannelClosed {
                        channel: link.remote_channel,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened(network: &MemoryNetwork, id: &str) -> MemoryTransport {
        let mut transport = network.transport(id);
        transport.open().unwrap();
        assert_eq!(
            transport.poll_events(),
            vec![TransportEvent::Ready {
                local_id: id.to_string()
            }]
        );
        transport
    }

    #[test]
    fn test_connect_and_exchange() {
        let network = MemoryNetwork::new();
        let mut a = opened(&network, "a");
        let mut b = opened(&network, "b");

        let channel = a.connect("b", ChannelOptions::default()).unwrap();
        assert_eq!(a.poll_events(), vec![TransportEvent::ChannelOpen { channel }]);

        let events = b.poll_events();
        let remote_channel = match events.as_slice() {
            [
                TransportEvent::Incoming { channel, peer },
                TransportEvent::ChannelOpen { channel: opened },
            ] => {
                assert_eq!(peer, "a");
                assert_eq!(channel, opened);
                *channel
            }
            other => panic!("unexpected events: {other:?}"),
        };

        a.send(channel, "hello").unwrap();
        b.send(remote_channel, "world").unwrap();
        assert_eq!(
            b.poll_events(),
            vec![TransportEvent::ChannelData {
                channel: remote_channel,
                data: "hello".to_string()
            }]
        );
        assert_eq!(
            a.poll_events(),
            vec![TransportEvent::ChannelData {
                channel,
                data: "world".to_string()
            }]
        );
    }

    #[test]
    fn test_connect_to_unknown_peer_reports_error() {
        let network = MemoryNetwork::new();
        let mut a = opened(&network, "a");

        let channel = a.connect("nobody", ChannelOptions::default()).unwrap();
        assert!(matches!(
            a.poll_events().as_slice(),
            [TransportEvent::Error { channel: Some(c), .. }] if *c == channel
        ));
        assert_eq!(a.connect_attempts(), 1);
    }

    #[test]
    fn test_connect_before_open_fails() {
        let network = MemoryNetwork::new();
        let mut a = network.transport("a");
        assert_eq!(a.connect("b", ChannelOptions::default()), Err(TransportError::NotReady));
        assert_eq!(a.connect_attempts(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let network = MemoryNetwork::new();
        let _a = opened(&network, "a");
        let mut again = network.transport("a");
        assert!(matches!(again.open(), Err(TransportError::Connection(_))));
    }

    #[test]
    fn test_close_notifies_both_sides() {
        let network = MemoryNetwork::new();
        let mut a = opened(&network, "a");
        let mut b = opened(&network, "b");

        let channel = a.connect("b", ChannelOptions::default()).unwrap();
        a.poll_events();
        b.poll_events();

        a.close(channel);
        assert_eq!(a.poll_events(), vec![TransportEvent::ChannelClosed { channel }]);
        assert!(matches!(b.poll_events().as_slice(), [TransportEvent::ChannelClosed { .. }]));
        assert_eq!(a.send(channel, "late"), Err(TransportError::UnknownChannel(channel)));
    }

    #[test]
    fn test_drop_unregisters_and_closes_links() {
        let network = MemoryNetwork::new();
        let mut a = opened(&network, "a");
        let mut b = opened(&network, "b");
        a.connect("b", ChannelOptions::default()).unwrap();
        b.poll_events();

        drop(a);
        assert!(!network.is_registered("a"));
        assert!(matches!(b.poll_events().as_slice(), [TransportEvent::ChannelClosed { .. }]));
    }
}
