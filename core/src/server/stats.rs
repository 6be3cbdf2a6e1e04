//! Listener statistics

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Counters since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    /// Connections handed to the dispatcher
    pub connections_accepted: u64,
    /// Connections that produced no bytes
    pub empty_reads: u64,
    pub probes_answered: u64,
    /// Probe replies that could not be written in time
    pub probe_reply_failures: u64,
    /// Data packets that got a routing decision
    pub packets_routed: u64,
    /// Decisions that also applied a SARSA update
    pub updates_applied: u64,
    pub forward_failures: u64,
    /// Packets that ended here because there is no neighbor
    pub delivered_locally: u64,
    /// Packets dropped without a decision
    pub packets_dropped: u64,
}

/// Shared, cloneable handle to the counters
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    inner: Arc<RwLock<ListenerStats>>,
}

impl StatsRecorder {
    pub fn snapshot(&self) -> ListenerStats {
        self.inner.read().clone()
    }

    pub fn connection_accepted(&self) {
        self.inner.write().connections_accepted += 1;
    }

    pub fn empty_read(&self) {
        self.inner.write().empty_reads += 1;
    }

    pub fn probe_answered(&self) {
        self.inner.write().probes_answered += 1;
    }

    pub fn probe_reply_failed(&self) {
        self.inner.write().probe_reply_failures += 1;
    }

    pub fn packet_routed(&self, updated: bool) {
        let mut stats = self.inner.write();
        stats.packets_routed += 1;
        if updated {
            stats.updates_applied += 1;
        }
    }

    pub fn forward_failed(&self) {
        self.inner.write().forward_failures += 1;
    }

    pub fn delivered_locally(&self) {
        self.inner.write().delivered_locally += 1;
    }

    pub fn packet_dropped(&self) {
        self.inner.write().packets_dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let stats = StatsRecorder::default();
        let handle = stats.clone();

        stats.connection_accepted();
        handle.packet_routed(true);
        handle.packet_routed(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.packets_routed, 2);
        assert_eq!(snapshot.updates_applied, 1);
    }
}
