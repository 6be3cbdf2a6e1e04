//! Static topology: node identifiers and the neighbor address table
//!
//! The neighbor table is loaded once at startup and never changes afterwards.
//! Its key set is the action space of the local routing state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use crate::RouterError;

/// Opaque identifier of a router (e.g. `"A"`, `"edge-3"`)
///
/// Ordering is the plain string ordering and is used as the
/// tie-break order wherever actions are compared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id, rejecting empty or whitespace-only tokens
    pub fn new(id: impl AsRef<str>) -> Result<Self, RouterError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(RouterError::InvalidConfig("node id must not be empty".into()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    /// Infallible conversion for literals; callers handling user input should
    /// go through [`NodeId::new`].
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Neighbor id -> network address, fixed for the lifetime of the node
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: BTreeMap<NodeId, SocketAddr>,
}

impl NeighborTable {
    /// Build the table for `local`, rejecting self-loops and duplicate ids
    pub fn new(
        local: &NodeId,
        entries: impl IntoIterator<Item = (NodeId, SocketAddr)>,
    ) -> Result<Self, RouterError> {
        let mut table = BTreeMap::new();
        for (id, addr) in entries {
            if &id == local {
                return Err(RouterError::InvalidConfig(format!(
                    "node {} lists itself as a neighbor",
                    id
                )));
            }
            if table.contains_key(&id) {
                return Err(RouterError::InvalidConfig(format!(
                    "neighbor {} is listed more than once",
                    id
                )));
            }
            table.insert(id, addr);
        }
        Ok(Self { entries: table })
    }

    /// Address of a neighbor
    pub fn address(&self, id: &NodeId) -> Option<SocketAddr> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    /// Neighbor ids in tie-break order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &SocketAddr)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_node_id_rejects_empty() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("   ").is_err());
        assert_eq!(NodeId::new(" A ").unwrap().as_str(), "A");
    }

    #[test]
    fn test_node_id_ordering() {
        let mut ids = vec![NodeId::from("C"), NodeId::from("A"), NodeId::from("B")];
        ids.sort();
        let names: Vec<_> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_neighbor_table_lookup() {
        let local = NodeId::from("A");
        let table = NeighborTable::new(
            &local,
            vec![(NodeId::from("C"), addr(9003)), (NodeId::from("B"), addr(9002))],
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.address(&NodeId::from("B")), Some(addr(9002)));
        assert!(table.address(&NodeId::from("Z")).is_none());

        let ids: Vec<_> = table.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
    }

    #[test]
    fn test_neighbor_table_rejects_self_loop() {
        let local = NodeId::from("A");
        let result = NeighborTable::new(&local, vec![(NodeId::from("A"), addr(9001))]);
        assert!(matches!(result, Err(RouterError::InvalidConfig(_))));
    }

    #[test]
    fn test_neighbor_table_rejects_duplicate_id() {
        let local = NodeId::from("A");
        let result = NeighborTable::new(
            &local,
            vec![(NodeId::from("B"), addr(9002)), (NodeId::from("B"), addr(9003))],
        );
        assert!(matches!(result, Err(RouterError::InvalidConfig(_))));
    }
}
