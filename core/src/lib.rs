// qroute core: adaptive next-hop routing
//
// Measures link delay to direct neighbors once, then learns which neighbor to
// forward to with SARSA over an epsilon-greedy policy, one step per packet.

pub mod config;
pub mod node;
pub mod probe;
pub mod routing;
pub mod server;
pub mod transport;

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

pub use config::RouterConfig;
pub use node::RouterNode;
pub use probe::{DelayProbe, LinkDelayCache, ProbeConfig, ProbeOutcome, ProbeReport};
pub use routing::{LearningParams, NeighborTable, NodeId, Policy, RoutingDecision, RoutingEngine, ValueTable};
pub use server::{DispatchOutcome, Dispatcher, Listener, ListenerStats, ProbeReplyMode};
pub use transport::{ForwardError, Forwarder, TcpForwarder};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown neighbor: {0}")]
    UnknownNeighbor(String),
    #[error("No route available")]
    NoRoute,
    #[error("Edge {state} -> {action} already measured")]
    EdgeAlreadyMeasured { state: String, action: String },
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;
