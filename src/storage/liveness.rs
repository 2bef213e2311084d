//! Liveness Responder
//!
//! A UDP endpoint answering the fixed probe token `PING` with `PONG` and any
//! other datagram with `UNKNOWN`. It runs alongside the engine's request loop
//! for external monitoring only; the failover path never consults it.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

pub const PROBE: &str = "PING";
pub const ACK: &str = "PONG";
pub const UNKNOWN: &str = "UNKNOWN";

pub fn reply_for(datagram: &[u8]) -> &'static str {
    let text = std::str::from_utf8(datagram).unwrap_or_default();
    if text.trim_end_matches(['\r', '\n']) == PROBE { ACK } else { UNKNOWN }
}

pub struct LivenessResponder {
    socket: Arc<UdpSocket>,
}

impl LivenessResponder {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!("Liveness responder listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serves probes until the task is dropped.
    pub async fn run(self) {
        let mut buf = vec![0u8; 512];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let reply = reply_for(&buf[..len]);
                    if let Err(e) = self.socket.send_to(reply.as_bytes(), src).await {
                        tracing::warn!("Failed to answer probe from {}: {}", src, e);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to receive liveness probe: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Sends one probe and reports whether `PONG` came back within `timeout`.
pub async fn probe(target: SocketAddr, timeout: Duration) -> Result<bool> {
    let bind: SocketAddr = if target.is_ipv6() {
        "[::]:0".parse()?
    } else {
        "0.0.0.0:0".parse()?
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;
    socket.send(PROBE.as_bytes()).await?;

    let mut buf = [0u8; 64];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => Ok(&buf[..len] == ACK.as_bytes()),
        Ok(Err(e)) => {
            tracing::debug!("Probe to {} failed: {}", target, e);
            Ok(false)
        }
        Err(_) => Ok(false),
    }
}
