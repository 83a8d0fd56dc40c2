//! Peer identity and the active-peer registry
//!
//! TCP fixes the peer at connect/accept time. UDP has no connection, so the
//! peer is either registered up front (client mode with `go_first`) or learned
//! from the first inbound datagram. Feed traffic is always addressed to the
//! single active peer.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::config::TransportKind;

/// Distinct strangers remembered per session; later ones are only counted
pub const MAX_TRACKED_STRANGERS: usize = 1024;

// ----------------------------------------------------------------------------
// Peer
// ----------------------------------------------------------------------------

/// An addressable remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub addr: SocketAddr,
    pub transport: TransportKind,
}

impl Peer {
    pub fn new(addr: SocketAddr, transport: TransportKind) -> Self {
        Self { addr, transport }
    }

    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(addr, TransportKind::Tcp)
    }

    pub fn udp(addr: SocketAddr) -> Self {
        Self::new(addr, TransportKind::Udp)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.addr)
    }
}

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// How the active peer became known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unknown,
    /// Supplied before any traffic (connect target, accepted socket)
    Registered(Peer),
    /// Learned from the first inbound datagram
    Learned(Peer),
}

/// Result of observing inbound traffic from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerObservation {
    /// First traffic while no peer was known; the sender is now active
    Learned(Peer),
    /// Traffic from the active peer
    Active,
    /// Traffic from some other peer; feed pacing ignores it. `first_seen` is
    /// false for repeat senders and for anyone past the tracking limit.
    Stranger { first_seen: bool },
}

#[derive(Debug, Clone)]
pub struct PeerRegistry {
    state: PeerState,
    strangers: HashSet<Peer>,
    untracked_strangers: u64,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            state: PeerState::Unknown,
            strangers: HashSet::new(),
            untracked_strangers: 0,
        }
    }

    /// Manually register the active peer. Ignored once a peer is known.
    pub fn register(&mut self, peer: Peer) -> bool {
        if self.state == PeerState::Unknown {
            self.state = PeerState::Registered(peer);
            true
        } else {
            false
        }
    }

    pub fn observe(&mut self, from: Peer) -> PeerObservation {
        match self.state {
            PeerState::Unknown => {
                self.state = PeerState::Learned(from);
                PeerObservation::Learned(from)
            }
            PeerState::Registered(active) | PeerState::Learned(active) if active == from => {
                PeerObservation::Active
            }
            _ => {
                let first_seen = if self.strangers.contains(&from) {
                    false
                } else if self.strangers.len() < MAX_TRACKED_STRANGERS {
                    self.strangers.insert(from)
                } else {
                    self.untracked_strangers += 1;
                    false
                };
                PeerObservation::Stranger { first_seen }
            }
        }
    }

    pub fn active(&self) -> Option<Peer> {
        match self.state {
            PeerState::Unknown => None,
            PeerState::Registered(peer) | PeerState::Learned(peer) => Some(peer),
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Non-active peers seen so far, up to `MAX_TRACKED_STRANGERS`
    pub fn strangers(&self) -> &HashSet<Peer> {
        &self.strangers
    }

    /// Datagrams from strangers that arrived after the tracking limit
    pub fn untracked_strangers(&self) -> u64 {
        self.untracked_strangers
    }
}
