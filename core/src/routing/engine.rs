//! Routing Decision Engine
//!
//! Turns one data packet into a next-hop decision and one learning step:
//!
//! 1. `state = local`, `action = choose(state)`
//! 2. `reward = -dynamic_delay(state, action)`
//! 3. `next_state = action`, `next_action = choose(next_state)` if known
//! 4. SARSA update when `next_action` exists
//!
//! The whole cycle runs under the table lock so concurrent packets never lose
//! an update.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::policy::Policy;
use super::topology::{NeighborTable, NodeId};
use super::value_table::{ValueSnapshot, ValueTable};
use crate::probe::LinkDelayCache;
use crate::RouterError;

/// Outcome of one decide/update cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub state: NodeId,
    /// Chosen next hop
    pub action: NodeId,
    /// Address of the chosen next hop
    pub address: SocketAddr,
    pub reward: f64,
    pub next_state: NodeId,
    /// `None` when the next state is not a known routing state
    pub next_action: Option<NodeId>,
    /// New value of `Q[state][action]`, if an update was applied
    pub updated_value: Option<f64>,
}

impl RoutingDecision {
    pub fn updated(&self) -> bool {
        self.updated_value.is_some()
    }
}

/// Mutable learning state, always touched together
struct LearningState {
    table: ValueTable,
    rng: StdRng,
}

pub struct RoutingEngine {
    local_id: NodeId,
    neighbors: NeighborTable,
    delays: Arc<LinkDelayCache>,
    policy: Policy,
    state: Mutex<LearningState>,
}

impl RoutingEngine {
    /// Create an engine with an entropy-seeded RNG
    pub fn new(
        local_id: NodeId,
        neighbors: NeighborTable,
        table: ValueTable,
        delays: Arc<LinkDelayCache>,
        policy: Policy,
    ) -> Result<Self, RouterError> {
        Self::with_rng(local_id, neighbors, table, delays, policy, StdRng::from_entropy())
    }

    /// Create an engine with a fixed RNG seed (reproducible decisions)
    pub fn with_seed(
        local_id: NodeId,
        neighbors: NeighborTable,
        table: ValueTable,
        delays: Arc<LinkDelayCache>,
        policy: Policy,
        seed: u64,
    ) -> Result<Self, RouterError> {
        Self::with_rng(
            local_id,
            neighbors,
            table,
            delays,
            policy,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        local_id: NodeId,
        neighbors: NeighborTable,
        table: ValueTable,
        delays: Arc<LinkDelayCache>,
        policy: Policy,
        rng: StdRng,
    ) -> Result<Self, RouterError> {
        let local_actions: Vec<NodeId> = table
            .actions(&local_id)
            .ok_or_else(|| {
                RouterError::InvalidConfig(format!("value table has no row for local node {}", local_id))
            })?
            .cloned()
            .collect();

        // Every action the policy can pick locally must be addressable
        for action in &local_actions {
            if !neighbors.contains(action) {
                return Err(RouterError::UnknownNeighbor(action.to_string()));
            }
        }
        if local_actions.len() != neighbors.len() {
            return Err(RouterError::InvalidConfig(format!(
                "local row of {} has {} actions but {} neighbors are configured",
                local_id,
                local_actions.len(),
                neighbors.len()
            )));
        }

        Ok(Self {
            local_id,
            neighbors,
            delays,
            policy,
            state: Mutex::new(LearningState { table, rng }),
        })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn delays(&self) -> &LinkDelayCache {
        &self.delays
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run one decide → reward → update cycle for the local state
    pub fn decide(&self) -> Result<RoutingDecision, RouterError> {
        let mut guard = self.state.lock();
        let LearningState { table, rng } = &mut *guard;

        let state = self.local_id.clone();
        let action = self
            .policy
            .choose_action(table, &state, rng)
            .ok_or(RouterError::NoRoute)?;
        let address = self
            .neighbors
            .address(&action)
            .ok_or_else(|| RouterError::UnknownNeighbor(action.to_string()))?;

        let reward = -self.delays.dynamic_delay(&state, &action, rng);

        let next_state = action.clone();
        let next_action = if table.has_state(&next_state) {
            self.policy.choose_action(table, &next_state, rng)
        } else {
            None
        };

        let updated_value = next_action.as_ref().map(|next_action| {
            self.policy
                .update(table, &state, &action, reward, &next_state, next_action)
        });

        tracing::debug!(
            "Decision {} -> {} (reward {:.2}, next {:?}, value {:?})",
            state,
            action,
            reward,
            next_action.as_ref().map(NodeId::as_str),
            updated_value
        );

        Ok(RoutingDecision {
            state,
            action,
            address,
            reward,
            next_state,
            next_action,
            updated_value,
        })
    }

    /// Current learned value of a cell
    pub fn value(&self, state: &NodeId, action: &NodeId) -> Option<f64> {
        self.state.lock().table.value(state, action)
    }

    pub fn value_snapshot(&self) -> ValueSnapshot {
        self.state.lock().table.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeConfig;
    use crate::routing::LearningParams;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    struct Fixture {
        local: NodeId,
        neighbors: NeighborTable,
        table: ValueTable,
        delays: LinkDelayCache,
    }

    fn fixture(edges: &[(&str, f64)]) -> Fixture {
        let local = NodeId::from("A");
        let neighbors = NeighborTable::new(
            &local,
            edges
                .iter()
                .enumerate()
                .map(|(i, (id, _))| (NodeId::from(*id), addr(9200 + i as u16))),
        )
        .unwrap();
        let table = ValueTable::for_neighbors(&local, &neighbors);
        let mut delays = LinkDelayCache::new(&ProbeConfig {
            noise_ms: 0.0,
            ..Default::default()
        });
        for (id, ms) in edges {
            delays.insert(local.clone(), NodeId::from(*id), *ms).unwrap();
        }
        Fixture {
            local,
            neighbors,
            table,
            delays,
        }
    }

    fn policy(epsilon: f64) -> Policy {
        Policy::new(LearningParams {
            epsilon,
            ..Default::default()
        })
        .unwrap()
    }

    fn engine(f: Fixture, epsilon: f64) -> RoutingEngine {
        RoutingEngine::with_seed(f.local, f.neighbors, f.table, Arc::new(f.delays), policy(epsilon), 9).unwrap()
    }

    #[test]
    fn test_no_update_without_next_state_row() {
        let engine = engine(fixture(&[("B", 10.0), ("C", 30.0)]), 0.0);

        let decision = engine.decide().unwrap();
        assert_eq!(decision.action, NodeId::from("B"));
        assert_eq!(decision.address, addr(9200));
        assert_eq!(decision.reward, -10.0);
        assert_eq!(decision.next_state, NodeId::from("B"));
        assert!(decision.next_action.is_none());
        assert!(!decision.updated());
        assert_eq!(engine.value(&NodeId::from("A"), &NodeId::from("B")), Some(0.0));
    }

    #[test]
    fn test_update_with_seeded_next_state() {
        let mut f = fixture(&[("B", 10.0)]);
        f.table.seed_state(NodeId::from("B"), vec![NodeId::from("D")]);
        let engine = engine(f, 0.0);

        let decision = engine.decide().unwrap();
        assert_eq!(decision.next_action, Some(NodeId::from("D")));
        assert_eq!(decision.updated_value, Some(-1.0));
        assert_eq!(engine.value(&NodeId::from("A"), &NodeId::from("B")), Some(-1.0));
    }

    #[test]
    fn test_unmeasured_edge_uses_penalty_reward() {
        let local = NodeId::from("A");
        let neighbors = NeighborTable::new(&local, vec![(NodeId::from("B"), addr(9300))]).unwrap();
        let table = ValueTable::for_neighbors(&local, &neighbors);
        let delays = LinkDelayCache::new(&ProbeConfig::default());
        let engine = RoutingEngine::with_seed(local, neighbors, table, Arc::new(delays), policy(0.0), 1).unwrap();

        assert_eq!(engine.decide().unwrap().reward, -1000.0);
    }

    #[test]
    fn test_no_neighbors_is_no_route() {
        let engine = engine(fixture(&[]), 0.0);
        assert!(matches!(engine.decide(), Err(RouterError::NoRoute)));
    }

    #[test]
    fn test_rejects_table_without_local_row() {
        let f = fixture(&[("B", 10.0)]);
        let result = RoutingEngine::new(
            NodeId::from("Z"),
            f.neighbors,
            f.table,
            Arc::new(f.delays),
            policy(0.0),
        );
        assert!(matches!(result, Err(RouterError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_action_without_address() {
        let mut f = fixture(&[("B", 10.0)]);
        f.table.set(&NodeId::from("A"), &NodeId::from("X"), 0.0);
        let result = RoutingEngine::new(f.local, f.neighbors, f.table, Arc::new(f.delays), policy(0.0));
        assert!(matches!(result, Err(RouterError::UnknownNeighbor(id)) if id == "X"));
    }

    #[test]
    fn test_concurrent_decisions_lose_no_update() {
        let mut f = fixture(&[("B", 10.0)]);
        f.table.seed_state(NodeId::from("B"), vec![NodeId::from("D")]);
        let engine = Arc::new(engine(f, 0.0));

        let threads = 8;
        let per_thread = 25;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        engine.decide().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Identical updates commute, so N sequential applications give
        // reward * (1 - (1 - alpha)^N)
        let n = (threads * per_thread) as i32;
        let expected = -10.0 * (1.0 - 0.9f64.powi(n));
        let value = engine.value(&NodeId::from("A"), &NodeId::from("B")).unwrap();
        assert!((value - expected).abs() < 1e-9, "value {} expected {}", value, expected);
    }
}
