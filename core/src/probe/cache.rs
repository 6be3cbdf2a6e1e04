//! Link delay cache
//!
//! One base delay per (local node, neighbor) edge, written once during
//! startup and shared read-only with the routing engine afterwards.

use std::collections::HashMap;

use futures::future::join_all;
use rand::Rng;

use super::delay::{DelayProbe, ProbeOutcome};
use super::ProbeConfig;
use crate::routing::{NeighborTable, NodeId};
use crate::RouterError;

#[derive(Debug, Clone)]
pub struct LinkDelayCache {
    /// (source, neighbor) -> base delay in milliseconds
    base: HashMap<(NodeId, NodeId), f64>,
    penalty_ms: f64,
    noise_ms: f64,
}

impl LinkDelayCache {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            base: HashMap::new(),
            penalty_ms: config.penalty_ms,
            noise_ms: config.noise_ms.abs(),
        }
    }

    /// Probe every neighbor concurrently and record one entry per edge.
    ///
    /// A probe task that dies unexpectedly still leaves the penalty value
    /// behind, so every configured neighbor ends up with an entry.
    pub async fn populate(local: &NodeId, neighbors: &NeighborTable, probe: DelayProbe) -> Self {
        let mut cache = Self::new(probe.config());

        let tasks = neighbors.iter().map(|(id, addr)| {
            let id = id.clone();
            let addr = *addr;
            let handle = tokio::spawn(async move { probe.measure(addr).await });
            async move { (id, addr, handle.await) }
        });

        for (neighbor, addr, joined) in join_all(tasks).await {
            let base = match joined {
                Ok(report) => {
                    match report.outcome() {
                        ProbeOutcome::Measured => tracing::info!(
                            "Base delay {} -> {} ({}): {:.2} ms ({}/{} samples answered)",
                            local,
                            neighbor,
                            addr,
                            report.mean_ms(),
                            report.measured_count(),
                            report.samples.len()
                        ),
                        ProbeOutcome::Penalized => tracing::warn!(
                            "Neighbor {} ({}) unreachable, using penalty {:.0} ms",
                            neighbor,
                            addr,
                            report.mean_ms()
                        ),
                    }
                    report.mean_ms()
                }
                Err(e) => {
                    tracing::error!("Probe task for {} failed: {}", neighbor, e);
                    cache.penalty_ms
                }
            };
            cache.base.insert((local.clone(), neighbor), base);
        }

        cache
    }

    /// Record a base delay; each edge can only be written once
    pub fn insert(&mut self, state: NodeId, action: NodeId, base_ms: f64) -> Result<(), RouterError> {
        if base_ms.is_nan() || base_ms < 0.0 {
            return Err(RouterError::InvalidConfig(format!(
                "base delay for {} -> {} must be non-negative, got {}",
                state, action, base_ms
            )));
        }
        let key = (state, action);
        if self.base.contains_key(&key) {
            return Err(RouterError::EdgeAlreadyMeasured {
                state: key.0.to_string(),
                action: key.1.to_string(),
            });
        }
        self.base.insert(key, base_ms);
        Ok(())
    }

    pub fn base_delay(&self, state: &NodeId, action: &NodeId) -> Option<f64> {
        self.base.get(&(state.clone(), action.clone())).copied()
    }

    /// Base delay plus uniform noise; the plain penalty for unmeasured edges
    pub fn dynamic_delay<R: Rng>(&self, state: &NodeId, action: &NodeId, rng: &mut R) -> f64 {
        match self.base_delay(state, action) {
            Some(base) if self.noise_ms > 0.0 => {
                base + rng.gen_range(-self.noise_ms..=self.noise_ms)
            }
            Some(base) => base,
            None => self.penalty_ms,
        }
    }

    pub fn penalty_ms(&self) -> f64 {
        self.penalty_ms
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn config(noise_ms: f64) -> ProbeConfig {
        ProbeConfig {
            samples: 2,
            timeout_ms: 300,
            noise_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_dynamic_delay_stays_within_noise_band() {
        let mut cache = LinkDelayCache::new(&config(20.0));
        let (a, b) = (NodeId::from("A"), NodeId::from("B"));
        cache.insert(a.clone(), b.clone(), 50.0).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let mut saw_below = false;
        let mut saw_above = false;
        for _ in 0..1000 {
            let d = cache.dynamic_delay(&a, &b, &mut rng);
            assert!((30.0..=70.0).contains(&d), "delay {} out of band", d);
            saw_below |= d < 50.0;
            saw_above |= d > 50.0;
        }
        assert!(saw_below && saw_above);
    }

    #[test]
    fn test_unmeasured_edge_is_penalty_without_noise() {
        let cache = LinkDelayCache::new(&config(20.0));
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            assert_eq!(
                cache.dynamic_delay(&NodeId::from("A"), &NodeId::from("Z"), &mut rng),
                1000.0
            );
        }
    }

    #[test]
    fn test_zero_noise_returns_base() {
        let mut cache = LinkDelayCache::new(&config(0.0));
        cache.insert(NodeId::from("A"), NodeId::from("B"), 12.5).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            cache.dynamic_delay(&NodeId::from("A"), &NodeId::from("B"), &mut rng),
            12.5
        );
    }

    #[test]
    fn test_edges_are_write_once() {
        let mut cache = LinkDelayCache::new(&config(0.0));
        cache.insert(NodeId::from("A"), NodeId::from("B"), 10.0).unwrap();
        let again = cache.insert(NodeId::from("A"), NodeId::from("B"), 20.0);

        assert!(matches!(again, Err(RouterError::EdgeAlreadyMeasured { .. })));
        assert_eq!(cache.base_delay(&NodeId::from("A"), &NodeId::from("B")), Some(10.0));
        assert!(cache.insert(NodeId::from("A"), NodeId::from("C"), -1.0).is_err());
    }

    #[tokio::test]
    async fn test_populate_covers_every_neighbor() {
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap();
        tokio::spawn(async move {
            // Swallow the ping and close without answering: counts as a reply
            while let Ok((mut stream, _)) = live.accept().await {
                let mut buf = [0u8; 4];
                let _ = stream.read_exact(&mut buf).await;
                drop(stream);
            }
        });

        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr: SocketAddr = dead.local_addr().unwrap();
        drop(dead);

        let local = NodeId::from("A");
        let neighbors = NeighborTable::new(
            &local,
            vec![(NodeId::from("B"), live_addr), (NodeId::from("C"), dead_addr)],
        )
        .unwrap();

        let cache = LinkDelayCache::populate(&local, &neighbors, DelayProbe::new(config(20.0))).await;

        assert_eq!(cache.len(), 2);
        let live_delay = cache.base_delay(&local, &NodeId::from("B")).unwrap();
        assert!(live_delay < 1000.0);
        assert_eq!(cache.base_delay(&local, &NodeId::from("C")), Some(1000.0));
    }
}
