//! Value table (Q-table)
//!
//! Maps a routing state to the learned value of each candidate next hop.
//! The local state's row always carries exactly the neighbor table's keys;
//! rows for other routers are optional and only exist when seeded.

use std::collections::BTreeMap;

use super::topology::{NeighborTable, NodeId};

/// One state's action values, in tie-break order
pub type ValueRow = BTreeMap<NodeId, f64>;

/// Point-in-time copy of the table, suitable for logging or serialization
pub type ValueSnapshot = BTreeMap<NodeId, ValueRow>;

#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    rows: BTreeMap<NodeId, ValueRow>,
}

impl ValueTable {
    /// Table with a single zeroed row for `local`, one entry per neighbor
    pub fn for_neighbors(local: &NodeId, neighbors: &NeighborTable) -> Self {
        let row = neighbors.ids().map(|id| (id.clone(), 0.0)).collect();
        let mut rows = BTreeMap::new();
        rows.insert(local.clone(), row);
        Self { rows }
    }

    /// Add a zeroed row for another router's state.
    ///
    /// Existing values are kept; only missing actions are added.
    pub fn seed_state(&mut self, state: NodeId, actions: impl IntoIterator<Item = NodeId>) {
        let row = self.rows.entry(state).or_default();
        for action in actions {
            row.entry(action).or_insert(0.0);
        }
    }

    pub fn has_state(&self, state: &NodeId) -> bool {
        self.rows.contains_key(state)
    }

    pub fn row(&self, state: &NodeId) -> Option<&ValueRow> {
        self.rows.get(state)
    }

    /// Candidate actions of a state, in tie-break order
    pub fn actions<'a>(&'a self, state: &NodeId) -> Option<impl Iterator<Item = &'a NodeId> + 'a> {
        self.rows.get(state).map(|row| row.keys())
    }

    pub fn value(&self, state: &NodeId, action: &NodeId) -> Option<f64> {
        self.rows.get(state).and_then(|row| row.get(action)).copied()
    }

    /// Overwrite a cell, creating the row and action if needed
    pub fn set(&mut self, state: &NodeId, action: &NodeId, value: f64) {
        self.rows
            .entry(state.clone())
            .or_default()
            .insert(action.clone(), value);
    }

    /// Action with the minimum value; ties go to the first in id order
    pub fn min_action(&self, state: &NodeId) -> Option<NodeId> {
        let row = self.rows.get(state)?;
        let mut best: Option<(&NodeId, f64)> = None;
        for (action, &value) in row {
            match best {
                Some((_, current)) if value >= current => {}
                _ => best = Some((action, value)),
            }
        }
        best.map(|(action, _)| action.clone())
    }

    pub fn state_count(&self) -> usize {
        self.rows.len()
    }

    pub fn snapshot(&self) -> ValueSnapshot {
        self.rows.clone()
    }
}
