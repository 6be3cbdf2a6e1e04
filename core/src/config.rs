//! Router configuration
//!
//! Static topology plus tuning constants. The binary loads this from a JSON
//! file; `validate` turns it into the typed inputs the node is built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::probe::ProbeConfig;
use crate::routing::{LearningParams, NeighborTable, NodeId};
use crate::server::{DispatchConfig, ListenerConfig, ProbeReplyMode, DEFAULT_MAX_CONNECTIONS};
use crate::transport::DEFAULT_READ_BUFFER;
use crate::RouterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// This router's identity
    pub node_id: String,

    /// Address the listener binds to
    pub listen_addr: SocketAddr,

    /// Direct neighbors: id -> address
    pub neighbors: BTreeMap<String, SocketAddr>,

    /// Extra value-table rows for other routers' states: state -> its actions.
    /// Without an entry for a neighbor, decisions routed to it never update.
    pub known_states: BTreeMap<String, Vec<String>>,

    /// SARSA constants
    pub learning: LearningParams,

    /// Delay probing
    pub probe: ProbeConfig,

    /// Bound on one forward (connect + write + flush)
    pub forward_timeout_ms: u64,

    /// Bound on the single inbound read
    pub read_timeout_ms: u64,

    /// Inbound read buffer; the largest routable packet
    pub read_buffer_size: usize,

    /// Connections handled concurrently
    pub max_connections: usize,

    /// How probe replies are sent
    pub probe_reply: ProbeReplyMode,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            node_id: "A".to_string(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 12345)),
            neighbors: BTreeMap::new(),
            known_states: BTreeMap::new(),
            learning: LearningParams::default(),
            probe: ProbeConfig::default(),
            forward_timeout_ms: 5000,
            read_timeout_ms: 10_000,
            read_buffer_size: DEFAULT_READ_BUFFER,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            probe_reply: ProbeReplyMode::SameConnection,
        }
    }
}

/// Typed topology derived from a validated config
#[derive(Debug, Clone)]
pub struct Topology {
    pub local_id: NodeId,
    pub neighbors: NeighborTable,
    pub known_states: Vec<(NodeId, Vec<NodeId>)>,
}

impl RouterConfig {
    /// Check constants and build the typed topology
    pub fn validate(&self) -> Result<Topology, RouterError> {
        self.learning.validate()?;

        if !(self.probe.penalty_ms.is_finite() && self.probe.penalty_ms >= 0.0) {
            return Err(RouterError::InvalidConfig(
                "probe.penalty_ms must be a non-negative number".into(),
            ));
        }
        if !self.probe.noise_ms.is_finite() || self.probe.noise_ms < 0.0 {
            return Err(RouterError::InvalidConfig(
                "probe.noise_ms must be a non-negative number".into(),
            ));
        }
        if self.probe.timeout_ms == 0 || self.forward_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(RouterError::InvalidConfig("timeouts must be greater than zero".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(RouterError::InvalidConfig("read_buffer_size must be greater than zero".into()));
        }
        if self.max_connections == 0 {
            return Err(RouterError::InvalidConfig("max_connections must be greater than zero".into()));
        }

        let local_id = NodeId::new(&self.node_id)?;
        let neighbors = NeighborTable::new(
            &local_id,
            self.neighbors
                .iter()
                .map(|(id, addr)| Ok((NodeId::new(id)?, *addr)))
                .collect::<Result<Vec<_>, RouterError>>()?,
        )?;

        let mut known_states: Vec<(NodeId, Vec<NodeId>)> = Vec::with_capacity(self.known_states.len());
        for (state, actions) in &self.known_states {
            let state = NodeId::new(state)?;
            if state == local_id {
                return Err(RouterError::InvalidConfig(format!(
                    "known_states must not redefine the local node {}",
                    local_id
                )));
            }
            if known_states.iter().any(|(seen, _)| *seen == state) {
                return Err(RouterError::InvalidConfig(format!(
                    "known_states lists {} more than once",
                    state
                )));
            }
            let mut ids = Vec::with_capacity(actions.len());
            for action in actions {
                let action = NodeId::new(action)?;
                if ids.contains(&action) {
                    return Err(RouterError::InvalidConfig(format!(
                        "known_states[{}] lists action {} more than once",
                        state, action
                    )));
                }
                ids.push(action);
            }
            known_states.push((state, ids));
        }

        Ok(Topology {
            local_id,
            neighbors,
            known_states,
        })
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            read_buffer_size: self.read_buffer_size,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            probe_reply: self.probe_reply,
            reply_timeout: self.forward_timeout(),
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_connections: self.max_connections,
        }
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}
