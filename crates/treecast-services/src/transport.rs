//! Multicast transport. One socket shared by every component of a peer.
//!
//! Joins the configured IPv4 group, decodes every datagram that arrives and
//! hands it to the router. Outgoing messages are queued by the components on
//! an unbounded channel and written to the group by a dedicated send loop.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use treecast_core::config::NetworkConfig;
use treecast_core::wire::{Message, MAX_DATAGRAM};

use crate::router::Router;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket setup failed at {step}: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("encoded message is {0} bytes, limit is {MAX_DATAGRAM}")]
    Oversized(usize),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
}

fn setup(step: &'static str) -> impl FnOnce(std::io::Error) -> TransportError {
    move |source| TransportError::Setup { step, source }
}

pub struct MulticastTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl MulticastTransport {
    /// Bind the group port on all interfaces and join `group`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(network: &NetworkConfig, group: Ipv4Addr) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(setup("socket()"))?;

        socket
            .set_reuse_address(network.reuse_addr)
            .map_err(setup("SO_REUSEADDR"))?;
        socket.set_nonblocking(true).map_err(setup("set_nonblocking"))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network.port);
        socket.bind(&bind_addr.into()).map_err(setup("bind()"))?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(setup("IP_ADD_MEMBERSHIP"))?;
        socket
            .set_multicast_ttl_v4(network.ttl)
            .map_err(setup("IP_MULTICAST_TTL"))?;
        socket
            .set_multicast_loop_v4(network.loopback)
            .map_err(setup("IP_MULTICAST_LOOP"))?;

        let socket = UdpSocket::from_std(socket.into()).map_err(setup("tokio UdpSocket"))?;

        tracing::info!(
            group = %group,
            port = network.port,
            ttl = network.ttl,
            loopback = network.loopback,
            "multicast transport bound"
        );

        Ok(Self {
            socket,
            group: SocketAddrV4::new(group, network.port),
        })
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    /// Encode and transmit one datagram to the group.
    pub async fn send(&self, message: &Message) -> Result<usize, TransportError> {
        let line = message.encode();
        if line.len() > MAX_DATAGRAM {
            return Err(TransportError::Oversized(line.len()));
        }
        let n = self
            .socket
            .send_to(line.as_bytes(), SocketAddr::V4(self.group))
            .await
            .map_err(TransportError::Send)?;
        tracing::debug!(bytes = n, %line, "sent");
        Ok(n)
    }

    /// Wait up to `timeout` for one datagram. `Ok(None)` means nothing
    /// decodable arrived in time.
    pub async fn receive(&self, timeout: Duration) -> std::io::Result<Option<Message>> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, from) = match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Err(_) => return Ok(None),
            Ok(r) => r?,
        };

        match Message::from_datagram(&buf[..len]) {
            Ok(message) => {
                tracing::debug!(%from, line = %message, "received");
                Ok(Some(message))
            }
            Err(e) => {
                tracing::debug!(%from, error = %e, "dropped unrecognized datagram");
                Ok(None)
            }
        }
    }
}

/// Receive, decode and route until shutdown.
pub async fn receive_loop(
    transport: Arc<MulticastTransport>,
    router: Arc<Router>,
    recv_timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(group = %transport.group(), "multicast receiver starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("multicast receiver shutting down");
                return;
            }
            received = transport.receive(recv_timeout) => match received {
                Ok(Some(message)) => router.route(message).await,
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "recv_from failed"),
            }
        }
    }
}

/// Drain the outbound queue onto the group until shutdown or until every
/// sender is gone. Failures are logged and the message is not retried.
pub async fn send_loop(
    transport: Arc<MulticastTransport>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("multicast sender shutting down");
                return;
            }
            next = outbound.recv() => {
                let Some(message) = next else {
                    tracing::info!("outbound queue closed, multicast sender exiting");
                    return;
                };
                if let Err(e) = transport.send(&message).await {
                    tracing::warn!(error = %e, kind = %message.body.kind(), "multicast send failed");
                }
            }
        }
    }
}
