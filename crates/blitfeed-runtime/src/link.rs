//! Link Trait Definition
//!
//! A `Link` is the sending half of an established connection. The receiving
//! half runs as a reader task that forwards `LinkEvent`s over an mpsc channel,
//! so the session task can wait on inbound traffic, injections and step
//! signals at once while owning the link exclusively.

use std::net::SocketAddr;
use std::sync::Arc;

use blitfeed_core::{Peer, TransportError, TransportKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Largest single read; one read becomes one inbound message
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

// ----------------------------------------------------------------------------
// Link Events
// ----------------------------------------------------------------------------

/// Inbound happenings on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Received { from: Peer, payload: Vec<u8> },
    /// Orderly close by the peer (TCP only)
    Closed,
    Failed { reason: String },
}

// ----------------------------------------------------------------------------
// Link Trait
// ----------------------------------------------------------------------------

/// Uniform message-oriented sending interface over TCP and UDP
#[async_trait::async_trait]
pub trait Link: Send {
    fn transport(&self) -> TransportKind;

    fn local_addr(&self) -> SocketAddr;

    /// Send one message. For TCP the peer is implied by the socket.
    async fn send(&mut self, peer: &Peer, payload: &[u8]) -> Result<(), TransportError>;

    /// Release the connection; further sends fail
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ----------------------------------------------------------------------------
// TCP Link
// ----------------------------------------------------------------------------

pub struct TcpLink {
    writer: OwnedWriteHalf,
    local_addr: SocketAddr,
    peer: Peer,
    reader: JoinHandle<()>,
}

impl TcpLink {
    /// Split an established stream and start its reader task
    pub fn spawn(stream: TcpStream, events: LinkEventSender) -> Result<Self, TransportError> {
        let local_addr = stream.local_addr()?;
        let peer = Peer::tcp(stream.peer_addr()?);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (read_half, writer) = stream.into_split();
        let reader = tokio::spawn(tcp_reader(read_half, peer, events));

        Ok(Self {
            writer,
            local_addr,
            peer,
            reader,
        })
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }
}

async fn tcp_reader(mut read_half: OwnedReadHalf, peer: Peer, events: LinkEventSender) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let event = match read_half.read(&mut buffer).await {
            Ok(0) => LinkEvent::Closed,
            Ok(n) => LinkEvent::Received {
                from: peer,
                payload: buffer[..n].to_vec(),
            },
            Err(e) => LinkEvent::Failed {
                reason: e.to_string(),
            },
        };
        let terminal = !matches!(event, LinkEvent::Received { .. });
        if events.send(event).is_err() {
            trace!("Link event receiver dropped, stopping TCP reader");
            break;
        }
        if terminal {
            break;
        }
    }
}

#[async_trait::async_trait]
impl Link for TcpLink {
    fn transport(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&mut self, peer: &Peer, payload: &[u8]) -> Result<(), TransportError> {
        if *peer != self.peer {
            warn!("TCP link to {} asked to send to {}", self.peer, peer);
        }
        let own_peer = self.peer;
        let to_transport = move |source| TransportError::Send {
            peer: own_peer.to_string(),
            source,
        };
        self.writer.write_all(payload).await.map_err(to_transport)?;
        self.writer.flush().await.map_err(to_transport)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.reader.abort();
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ----------------------------------------------------------------------------
// UDP Link
// ----------------------------------------------------------------------------

pub struct UdpLink {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    reader: JoinHandle<()>,
}

impl UdpLink {
    /// Wrap a bound socket and start its reader task
    pub fn spawn(socket: UdpSocket, events: LinkEventSender) -> Result<Self, TransportError> {
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let reader = tokio::spawn(udp_reader(socket.clone(), events));

        Ok(Self {
            socket,
            local_addr,
            reader,
        })
    }
}

async fn udp_reader(socket: Arc<UdpSocket>, events: LinkEventSender) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let event = match socket.recv_from(&mut buffer).await {
            Ok((n, from)) => LinkEvent::Received {
                from: Peer::udp(from),
                payload: buffer[..n].to_vec(),
            },
            // ICMP unreachable from an earlier send; UDP has no close, keep going
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                warn!("UDP peer unreachable: {}", e);
                continue;
            }
            Err(e) => LinkEvent::Failed {
                reason: e.to_string(),
            },
        };
        let terminal = matches!(event, LinkEvent::Failed { .. });
        if events.send(event).is_err() {
            trace!("Link event receiver dropped, stopping UDP reader");
            break;
        }
        if terminal {
            break;
        }
    }
}

#[async_trait::async_trait]
impl Link for UdpLink {
    fn transport(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&mut self, peer: &Peer, payload: &[u8]) -> Result<(), TransportError> {
        let written = self
            .socket
            .send_to(payload, peer.addr)
            .await
            .map_err(|source| TransportError::Send {
                peer: peer.to_string(),
                source,
            })?;
        if written < payload.len() {
            warn!(
                "Datagram to {} truncated: {} of {} bytes",
                peer,
                written,
                payload.len()
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
