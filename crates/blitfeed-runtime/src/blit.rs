//! Blit Channel
//!
//! A local TCP listener through which an operator injects extra messages into
//! the live session. Every read on a control connection becomes one injected
//! message. Any number of control connections may be open; their payloads are
//! merged into a single stream in receipt order.

use std::net::SocketAddr;

use blitfeed_core::{Endpoint, Message, TransportError};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::adapter::resolve;
use crate::link::READ_BUFFER_SIZE;

pub type InjectionSender = mpsc::UnboundedSender<Message>;
pub type InjectionReceiver = mpsc::UnboundedReceiver<Message>;

/// Running blit listener; dropping it stops accepting and closes every control
/// connection
pub struct BlitChannel {
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl BlitChannel {
    pub async fn bind(
        endpoint: &Endpoint,
        injections: InjectionSender,
    ) -> Result<Self, TransportError> {
        let addr = resolve(endpoint).await?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Blit channel listening on {}", local_addr);

        let acceptor = tokio::spawn(accept_loop(listener, injections));
        Ok(Self {
            local_addr,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for BlitChannel {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, injections: InjectionSender) {
    // Owned here so aborting the acceptor also aborts every control connection
    let mut controls = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    debug!("Blit control connection from {}", remote);
                    controls.spawn(control_reader(stream, remote, injections.clone()));
                }
                Err(e) => warn!("Blit accept failed: {}", e),
            },
            Some(_) = controls.join_next(), if !controls.is_empty() => {}
        }
    }
}

async fn control_reader(mut stream: TcpStream, remote: SocketAddr, injections: InjectionSender) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let annotation = format!("blit:{}", remote);
    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => {
                debug!("Blit control connection {} closed", remote);
                return;
            }
            Ok(n) => {
                let message =
                    Message::new(buffer[..n].to_vec()).with_annotation(annotation.clone());
                trace!("Blit read {} bytes from {}", n, remote);
                if injections.send(message).is_err() {
                    warn!("Session gone, dropping {} injected bytes from {}", n, remote);
                    return;
                }
            }
            Err(e) => {
                warn!("Blit control connection {} failed: {}", remote, e);
                return;
            }
        }
    }
}
