//! Adaptive routing: online SARSA over next-hop choices
//!
//! - Topology: node ids and the fixed neighbor address table
//! - Value table: learned value per (state, next hop)
//! - Policy: epsilon-greedy selection and the SARSA update rule
//! - Engine: one decide → reward → update cycle per data packet, atomic
//!   with respect to the shared value table

pub mod engine;
pub mod policy;
pub mod topology;
pub mod value_table;

pub use engine::{RoutingDecision, RoutingEngine};
pub use policy::{LearningParams, Policy};
pub use topology::{NeighborTable, NodeId};
pub use value_table::{ValueRow, ValueSnapshot, ValueTable};
