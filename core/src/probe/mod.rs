//! Link-delay measurement
//!
//! - [`delay`]: `ping`/`pong` round-trip probe to a single neighbor
//! - [`cache`]: per-edge base delays measured once at startup, plus the noisy
//!   per-decision delay used as the reward signal

pub mod cache;
pub mod delay;

pub use cache::LinkDelayCache;
pub use delay::{DelayProbe, ProbeFailure, ProbeOutcome, ProbeReport, ProbeSample};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Penalty recorded for a failed probe sample or an unmeasured edge
pub const DEFAULT_PENALTY_MS: f64 = 1000.0;

/// Probe and delay-noise settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Samples averaged per neighbor
    pub samples: usize,
    /// Bound on a single sample (connect + write + reply)
    pub timeout_ms: u64,
    /// Value recorded for failed samples and unmeasured edges
    pub penalty_ms: f64,
    /// Half-width of the uniform noise added to base delays
    pub noise_ms: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            timeout_ms: 2000,
            penalty_ms: DEFAULT_PENALTY_MS,
            noise_ms: 20.0,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
