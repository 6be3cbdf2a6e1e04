//! Round-trip delay probe
//!
//! Each sample opens a fresh connection, writes the `ping` marker and waits
//! for one read. Failures never escape: a refused, reset or timed-out sample
//! is recorded as the configured penalty.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::ProbeConfig;
use crate::transport::PROBE_REQUEST;

/// Largest reply read per sample
const REPLY_BUFFER: usize = 100;

/// Why a sample was penalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Refused,
    TimedOut,
    Io(String),
}

impl From<io::Error> for ProbeFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ProbeFailure::Refused,
            io::ErrorKind::TimedOut => ProbeFailure::TimedOut,
            _ => ProbeFailure::Io(err.to_string()),
        }
    }
}

/// One probe sample
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeSample {
    /// Reply (or orderly close) observed after `elapsed_ms`
    Measured { elapsed_ms: f64 },
    /// No reply; counted as the penalty value
    Penalized { penalty_ms: f64, reason: ProbeFailure },
}

impl ProbeSample {
    pub fn millis(&self) -> f64 {
        match self {
            ProbeSample::Measured { elapsed_ms } => *elapsed_ms,
            ProbeSample::Penalized { penalty_ms, .. } => *penalty_ms,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, ProbeSample::Measured { .. })
    }
}

/// Whether a report reflects real latency or only the penalty default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// At least one sample got a reply
    Measured,
    /// Every sample failed
    Penalized,
}

/// All samples of one measurement
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub samples: Vec<ProbeSample>,
}

impl ProbeReport {
    /// Arithmetic mean over measured and penalized samples alike
    pub fn mean_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.samples.iter().map(ProbeSample::millis).sum();
        total / self.samples.len() as f64
    }

    pub fn measured_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_measured()).count()
    }

    pub fn penalized_count(&self) -> usize {
        self.samples.len() - self.measured_count()
    }

    pub fn outcome(&self) -> ProbeOutcome {
        if self.measured_count() > 0 {
            ProbeOutcome::Measured
        } else {
            ProbeOutcome::Penalized
        }
    }
}

/// Measures round-trip latency to a neighbor
#[derive(Debug, Clone, Copy)]
pub struct DelayProbe {
    config: ProbeConfig,
}

impl DelayProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Take `samples` sequential samples against `addr` (at least one)
    pub async fn measure(&self, addr: SocketAddr) -> ProbeReport {
        let count = self.config.samples.max(1);
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            samples.push(self.sample(addr).await);
        }
        ProbeReport { samples }
    }

    async fn sample(&self, addr: SocketAddr) -> ProbeSample {
        let started = Instant::now();
        // The stream lives inside the future; it is dropped (closed) on every
        // path, including when the timeout cancels it.
        let result = match timeout(self.config.timeout(), Self::exchange(addr)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProbeFailure::from(e)),
            Err(_) => Err(ProbeFailure::TimedOut),
        };

        match result {
            Ok(()) => ProbeSample::Measured {
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            },
            Err(reason) => {
                tracing::debug!("Probe to {} failed: {:?}", addr, reason);
                ProbeSample::Penalized {
                    penalty_ms: self.config.penalty_ms,
                    reason,
                }
            }
        }
    }

    async fn exchange(addr: SocketAddr) -> io::Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(PROBE_REQUEST).await?;
        stream.flush().await?;

        // Peers that answer on a back-connection just close this one, so an
        // empty read still counts as a reply.
        let mut reply = [0u8; REPLY_BUFFER];
        let _ = stream.read(&mut reply).await?;
        Ok(())
    }
}
