//! Connection Adapter
//!
//! Turns the configured role/transport pair into an established `Link`:
//! - TCP client: connect (optionally from a fixed local address)
//! - TCP server: listen and accept exactly one connection
//! - UDP client: bind; with `go_first` the target becomes the active peer
//! - UDP server: bind and let the first datagram name the peer
//!
//! A fresh adapter is used for every supervisor cycle.

use std::net::SocketAddr;

use blitfeed_core::{Endpoint, Peer, ReplayConfig, Role, TransportError, TransportKind};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::link::{Link, LinkEventReceiver, TcpLink, UdpLink};

/// An established connection, ready for a session
pub struct Established {
    pub link: Box<dyn Link>,
    pub events: LinkEventReceiver,
    /// Peer known at establishment time, if any
    pub peer: Option<Peer>,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("transport", &self.link.transport())
            .field("local_addr", &self.link.local_addr())
            .field("peer", &self.peer)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionAdapter {
    role: Role,
    transport: TransportKind,
    target: Option<Endpoint>,
    local: Option<Endpoint>,
    go_first: bool,
}

impl ConnectionAdapter {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            role: config.role,
            transport: config.transport,
            target: config.target.clone(),
            local: config.listen.clone(),
            go_first: config.flags.go_first,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Connect or listen according to the configured role and transport
    pub async fn establish(&self) -> Result<Established, TransportError> {
        match (self.role, self.transport) {
            (Role::Client, TransportKind::Tcp) => self.connect_tcp().await,
            (Role::Server, TransportKind::Tcp) => self.accept_tcp().await,
            (Role::Client, TransportKind::Udp) => self.bind_udp_client().await,
            (Role::Server, TransportKind::Udp) => self.bind_udp_server().await,
        }
    }

    async fn connect_tcp(&self) -> Result<Established, TransportError> {
        let target = resolve(self.required_target()?).await?;
        info!("Connecting to {}", target);

        let stream = match &self.local {
            Some(local) => {
                let local = resolve(local).await?;
                let socket = if local.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(local).map_err(|source| TransportError::Bind {
                    addr: local.to_string(),
                    source,
                })?;
                socket.connect(target).await
            }
            None => TcpStream::connect(target).await,
        }
        .map_err(|source| TransportError::Connect {
            addr: target.to_string(),
            source,
        })?;

        let (sender, events) = mpsc::unbounded_channel();
        let link = TcpLink::spawn(stream, sender)?;
        let peer = link.peer();
        Ok(Established {
            link: Box::new(link),
            events,
            peer: Some(peer),
        })
    }

    async fn accept_tcp(&self) -> Result<Established, TransportError> {
        let local = resolve(self.required_listen()?).await?;
        let listener = TcpListener::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                addr: local.to_string(),
                source,
            })?;
        info!("Listening on tcp://{}", listener.local_addr()?);

        let (stream, remote) = listener.accept().await.map_err(TransportError::Accept)?;
        debug!("Accepted connection from {}", remote);
        // One peer per session; stop listening until the next cycle
        drop(listener);

        let (sender, events) = mpsc::unbounded_channel();
        let link = TcpLink::spawn(stream, sender)?;
        let peer = link.peer();
        Ok(Established {
            link: Box::new(link),
            events,
            peer: Some(peer),
        })
    }

    async fn bind_udp_client(&self) -> Result<Established, TransportError> {
        let target = resolve(self.required_target()?).await?;
        let local = match &self.local {
            Some(local) => resolve(local).await?,
            None if target.is_ipv4() => SocketAddr::from(([0, 0, 0, 0], 0)),
            None => SocketAddr::from(([0u16; 8], 0)),
        };
        let socket = bind_udp(local).await?;
        info!("UDP socket bound on {}, target {}", socket.local_addr()?, target);

        let peer = self.go_first.then(|| Peer::udp(target));
        let (sender, events) = mpsc::unbounded_channel();
        Ok(Established {
            link: Box::new(UdpLink::spawn(socket, sender)?),
            events,
            peer,
        })
    }

    async fn bind_udp_server(&self) -> Result<Established, TransportError> {
        let local = resolve(self.required_listen()?).await?;
        let socket = bind_udp(local).await?;
        info!("Listening on udp://{}", socket.local_addr()?);

        let (sender, events) = mpsc::unbounded_channel();
        Ok(Established {
            link: Box::new(UdpLink::spawn(socket, sender)?),
            events,
            peer: None,
        })
    }

    fn required_target(&self) -> Result<&Endpoint, TransportError> {
        self.target.as_ref().ok_or_else(|| TransportError::Resolve {
            endpoint: "<none>".to_string(),
            reason: "no target address configured".to_string(),
        })
    }

    fn required_listen(&self) -> Result<&Endpoint, TransportError> {
        self.local.as_ref().ok_or_else(|| TransportError::Resolve {
            endpoint: "<none>".to_string(),
            reason: "no listen address configured".to_string(),
        })
    }
}

async fn bind_udp(local: SocketAddr) -> Result<UdpSocket, TransportError> {
    UdpSocket::bind(local)
        .await
        .map_err(|source| TransportError::Bind {
            addr: local.to_string(),
            source,
        })
}

/// Resolve an endpoint to its first socket address
pub async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, TransportError> {
    if let Some(addr) = endpoint.socket_addr() {
        return Ok(addr);
    }
    lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| TransportError::Resolve {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| TransportError::Resolve {
            endpoint: endpoint.to_string(),
            reason: "no addresses found".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkEvent;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    fn config(role: Role, transport: TransportKind) -> ReplayConfig {
        ReplayConfig {
            role,
            transport,
            ..ReplayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_literal_and_localhost() {
        let literal: Endpoint = "127.0.0.1:80".parse().unwrap();
        assert_eq!(
            resolve(&literal).await.unwrap(),
            "127.0.0.1:80".parse::<SocketAddr>().unwrap()
        );

        let named: Endpoint = "localhost:80".parse().unwrap();
        let addr = resolve(&named).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 80);
    }

    #[tokio::test]
    async fn test_tcp_client_connects_and_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();

        let mut cfg = config(Role::Client, TransportKind::Tcp);
        cfg.target = Some(server_addr.into());
        let adapter = ConnectionAdapter::new(&cfg);

        let (connected, accepted) = tokio::join!(adapter.establish(), listener.accept());
        let mut established = connected.unwrap();
        let (mut remote, _) = accepted.unwrap();
        assert_eq!(established.peer, Some(Peer::tcp(server_addr)));

        remote.write_all(b"hello").await.unwrap();
        let event = timeout(Duration::from_secs(2), established.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, LinkEvent::Received { ref payload, .. } if payload == b"hello"));

        let peer = established.peer.unwrap();
        established.link.send(&peer, b"world").await.unwrap();
        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        drop(remote);
        let event = timeout(Duration::from_secs(2), established.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, LinkEvent::Closed);
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        // Grab a free port and release it so nothing is listening there
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut cfg = config(Role::Client, TransportKind::Tcp);
        cfg.target = Some(Endpoint::new("127.0.0.1", port));

        let result = ConnectionAdapter::new(&cfg).establish().await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_udp_client_registers_target_only_with_go_first() {
        let mut cfg = config(Role::Client, TransportKind::Udp);
        cfg.target = Some("127.0.0.1:9".parse().unwrap());

        let established = ConnectionAdapter::new(&cfg).establish().await.unwrap();
        assert_eq!(established.peer, None);
        assert_eq!(established.link.transport(), TransportKind::Udp);

        cfg.flags.go_first = true;
        let established = ConnectionAdapter::new(&cfg).establish().await.unwrap();
        assert_eq!(
            established.peer,
            Some(Peer::udp("127.0.0.1:9".parse().unwrap()))
        );
    }

    #[tokio::test]
    async fn test_udp_server_learns_nothing_until_traffic() {
        let mut cfg = config(Role::Server, TransportKind::Udp);
        cfg.listen = Some("127.0.0.1:0".parse().unwrap());

        let mut established = ConnectionAdapter::new(&cfg).establish().await.unwrap();
        assert_eq!(established.peer, None);
        let server_addr = established.link.local_addr();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"ping", server_addr).await.unwrap();

        let event = timeout(Duration::from_secs(2), established.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            LinkEvent::Received {
                from: Peer::udp(client.local_addr().unwrap()),
                payload: b"ping".to_vec(),
            }
        );
    }
}
