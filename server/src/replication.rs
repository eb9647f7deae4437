//! Outbound fan-out of authoritative state.
//!
//! The replication channel keeps an explicit list of subscribed
//! connections. Broadcasts are expanded into one unicast per subscriber
//! and queued, in order, for the single network sender task.

use log::{error, warn};
use shared::{ConnectionId, Packet};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A packet waiting to be written to the socket.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub addr: SocketAddr,
    pub packet: Packet,
}

pub struct ReplicationChannel {
    subscribers: BTreeMap<ConnectionId, SocketAddr>,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
}

impl ReplicationChannel {
    pub fn new(outbound: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            subscribers: BTreeMap::new(),
            outbound: Some(outbound),
        }
    }

    pub fn subscribe(&mut self, connection: ConnectionId, addr: SocketAddr) {
        self.subscribers.insert(connection, addr);
    }

    pub fn unsubscribe(&mut self, connection: ConnectionId) -> Option<SocketAddr> {
        self.subscribers.remove(&connection)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends a packet to every subscriber.
    pub fn broadcast(&self, packet: &Packet) {
        for addr in self.subscribers.values() {
            self.push(*addr, packet.clone());
        }
    }

    /// Sends a packet to one subscriber. Returns false if the connection is
    /// not subscribed.
    pub fn send_to(&self, connection: ConnectionId, packet: &Packet) -> bool {
        match self.subscribers.get(&connection) {
            Some(addr) => {
                self.push(*addr, packet.clone());
                true
            }
            None => {
                warn!("Dropping packet for unsubscribed connection {}", connection);
                false
            }
        }
    }

    /// Sends to an address that has no subscription, such as a peer whose
    /// join was refused.
    pub fn send_to_addr(&self, addr: SocketAddr, packet: &Packet) {
        self.push(addr, packet.clone());
    }

    /// Drops every subscriber and closes the outbound queue. Packets queued
    /// before the call are still delivered by the sender task.
    pub fn close(&mut self) {
        self.subscribers.clear();
        self.outbound = None;
    }

    fn push(&self, addr: SocketAddr, packet: Packet) {
        let Some(outbound) = &self.outbound else {
            warn!("Replication closed, dropping packet for {}", addr);
            return;
        };

        if let Err(e) = outbound.send(Outgoing { addr, packet }) {
            error!("Failed to queue packet for {}: {}", addr, e);
        }
    }
}
