//! Best-effort packet forwarding to a neighbor
//!
//! One connection per packet: connect, write everything, flush, close.
//! No acknowledgment and no retry.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::routing::NodeId;

/// Default bound on a whole forward (connect + write + flush)
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Write to {addr} failed: {source}")]
    Write {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Forward to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
}

/// Delivers a packet to a neighbor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn send(&self, neighbor: &NodeId, addr: SocketAddr, packet: &[u8]) -> Result<(), ForwardError>;
}

/// Forwarder over plain TCP
#[derive(Debug, Clone)]
pub struct TcpForwarder {
    timeout: Duration,
}

impl TcpForwarder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn deliver(addr: SocketAddr, packet: &[u8]) -> Result<(), ForwardError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ForwardError::Connect { addr, source })?;

        let write = async {
            stream.write_all(packet).await?;
            stream.flush().await?;
            stream.shutdown().await
        };
        write
            .await
            .map_err(|source| ForwardError::Write { addr, source })
    }
}

impl Default for TcpForwarder {
    fn default() -> Self {
        Self::new(DEFAULT_FORWARD_TIMEOUT)
    }
}

#[async_trait]
impl Forwarder for TcpForwarder {
    async fn send(&self, neighbor: &NodeId, addr: SocketAddr, packet: &[u8]) -> Result<(), ForwardError> {
        match timeout(self.timeout, Self::deliver(addr, packet)).await {
            Ok(Ok(())) => {
                tracing::debug!("Packet ({} bytes) forwarded to {} at {}", packet.len(), neighbor, addr);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ForwardError::Timeout {
                addr,
                timeout: self.timeout,
            }),
        }
    }
}
