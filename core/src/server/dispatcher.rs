//! Per-connection dispatch
//!
//! `ACCEPTED → READ → {PROBE_REPLY | ROUTE} → (UPDATE) → FORWARD_OR_RESPOND → CLOSED`
//!
//! Every handler is terminal and independent: it reads once, answers a probe
//! or drives one routing cycle, and drops the connection on every path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::stats::StatsRecorder;
use crate::routing::{NodeId, RoutingEngine};
use crate::transport::{Forwarder, Frame, DEFAULT_READ_BUFFER, PROBE_REPLY};
use crate::RouterError;

/// Where a probe reply is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeReplyMode {
    /// Answer on the probing connection itself
    #[default]
    SameConnection,
    /// Open a new connection to the prober's address and answer there
    BackConnection,
}

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Single-read buffer size; longer payloads are truncated to this
    pub read_buffer_size: usize,
    /// Bound on the single inbound read
    pub read_timeout: Duration,
    pub probe_reply: ProbeReplyMode,
    /// Bound on a probe reply, including the back-connection connect
    pub reply_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER,
            read_timeout: Duration::from_secs(10),
            probe_reply: ProbeReplyMode::SameConnection,
            reply_timeout: Duration::from_secs(5),
        }
    }
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing was read (peer closed, read error or read timeout)
    Closed,
    ProbeAnswered,
    /// Probe reply could not be written
    ProbeReplyFailed,
    Forwarded {
        to: NodeId,
        bytes: usize,
        updated: bool,
    },
    /// Routing decision made, delivery failed; the packet is dropped
    ForwardFailed { to: NodeId, updated: bool },
    /// No neighbors: this node is the packet's final stop
    Delivered { bytes: usize },
    /// No decision could be made
    Dropped,
}

pub struct Dispatcher {
    engine: Arc<RoutingEngine>,
    forwarder: Arc<dyn Forwarder>,
    config: DispatchConfig,
    stats: StatsRecorder,
}

impl Dispatcher {
    pub fn new(engine: Arc<RoutingEngine>, forwarder: Arc<dyn Forwarder>, config: DispatchConfig) -> Self {
        Self {
            engine,
            forwarder,
            config,
            stats: StatsRecorder::default(),
        }
    }

    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Handle one accepted TCP connection to completion
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> DispatchOutcome {
        self.handle_stream(stream, peer).await
    }

    /// Handle any byte stream; `peer` is only used for back-connection
    /// probe replies and logging
    pub async fn handle_stream<S>(&self, mut stream: S, peer: SocketAddr) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.stats.connection_accepted();

        // READ
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let n = match timeout(self.config.read_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!("Read from {} failed: {}", peer, e);
                self.stats.empty_read();
                return DispatchOutcome::Closed;
            }
            Err(_) => {
                tracing::debug!("Read from {} timed out", peer);
                self.stats.empty_read();
                return DispatchOutcome::Closed;
            }
        };

        match Frame::classify(&buf[..n]) {
            Frame::Empty => {
                self.stats.empty_read();
                DispatchOutcome::Closed
            }
            Frame::Probe => self.reply_probe(&mut stream, peer).await,
            Frame::Data(packet) => {
                tracing::info!("Received {} bytes from {}", packet.len(), peer);
                self.route(packet).await
            }
        }
    }

    async fn reply_probe<S>(&self, stream: &mut S, peer: SocketAddr) -> DispatchOutcome
    where
        S: AsyncWrite + Unpin,
    {
        let reply = async {
            match self.config.probe_reply {
                ProbeReplyMode::SameConnection => write_reply(stream).await,
                ProbeReplyMode::BackConnection => match TcpStream::connect(peer).await {
                    Ok(mut back) => write_reply(&mut back).await,
                    Err(e) => Err(e),
                },
            }
        };

        match timeout(self.config.reply_timeout, reply).await {
            Ok(Ok(())) => {
                tracing::debug!("Answered probe from {}", peer);
                self.stats.probe_answered();
                DispatchOutcome::ProbeAnswered
            }
            Ok(Err(e)) => {
                tracing::warn!("Probe reply to {} failed: {}", peer, e);
                self.stats.probe_reply_failed();
                DispatchOutcome::ProbeReplyFailed
            }
            Err(_) => {
                tracing::warn!(
                    "Probe reply to {} timed out after {:?}",
                    peer,
                    self.config.reply_timeout
                );
                self.stats.probe_reply_failed();
                DispatchOutcome::ProbeReplyFailed
            }
        }
    }

    /// ROUTE → UPDATE → FORWARD
    pub async fn route(&self, packet: &[u8]) -> DispatchOutcome {
        let decision = match self.engine.decide() {
            Ok(decision) => decision,
            Err(RouterError::NoRoute) => {
                tracing::info!(
                    "Packet ({} bytes) delivered at {}: no onward neighbors",
                    packet.len(),
                    self.engine.local_id()
                );
                self.stats.delivered_locally();
                return DispatchOutcome::Delivered { bytes: packet.len() };
            }
            Err(e) => {
                tracing::error!("Routing decision failed: {}", e);
                self.stats.packet_dropped();
                return DispatchOutcome::Dropped;
            }
        };

        let updated = decision.updated();
        self.stats.packet_routed(updated);

        match self
            .forwarder
            .send(&decision.action, decision.address, packet)
            .await
        {
            Ok(()) => {
                tracing::info!("Packet forwarded to {}", decision.action);
                DispatchOutcome::Forwarded {
                    to: decision.action,
                    bytes: packet.len(),
                    updated,
                }
            }
            Err(e) => {
                tracing::warn!("Dropping packet for {}: {}", decision.action, e);
                self.stats.forward_failed();
                DispatchOutcome::ForwardFailed {
                    to: decision.action,
                    updated,
                }
            }
        }
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(stream: &mut W) -> std::io::Result<()> {
    stream.write_all(PROBE_REPLY).await?;
    stream.flush().await
}
