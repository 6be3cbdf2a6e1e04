//! Router node: startup wiring
//!
//! Startup order matters: base delays are measured and frozen before the
//! listener is bound, so every connection handler sees the complete cache.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{RouterConfig, Topology};
use crate::probe::{DelayProbe, LinkDelayCache};
use crate::routing::{Policy, RoutingEngine, ValueTable};
use crate::server::{Dispatcher, Listener, ListenerStats};
use crate::transport::{Forwarder, TcpForwarder};
use crate::RouterError;

pub struct RouterNode {
    engine: Arc<RoutingEngine>,
    listener: Listener,
}

impl RouterNode {
    /// Validate `config`, probe every neighbor, then bind the listener
    pub async fn start(config: RouterConfig) -> Result<Self, RouterError> {
        let topology = config.validate()?;
        tracing::info!(
            "Node {} measuring base delays to {} neighbor(s)",
            topology.local_id,
            topology.neighbors.len()
        );
        let delays = LinkDelayCache::populate(
            &topology.local_id,
            &topology.neighbors,
            DelayProbe::new(config.probe),
        )
        .await;

        Self::assemble(&config, topology, delays, Arc::new(TcpForwarder::new(config.forward_timeout()))).await
    }

    /// Start with an already-populated delay cache and a custom forwarder
    pub async fn start_with(
        config: RouterConfig,
        delays: LinkDelayCache,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, RouterError> {
        let topology = config.validate()?;
        Self::assemble(&config, topology, delays, forwarder).await
    }

    async fn assemble(
        config: &RouterConfig,
        topology: Topology,
        delays: LinkDelayCache,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, RouterError> {
        let Topology {
            local_id,
            neighbors,
            known_states,
        } = topology;

        let mut table = ValueTable::for_neighbors(&local_id, &neighbors);
        for (state, actions) in known_states {
            table.seed_state(state, actions);
        }

        let policy = Policy::new(config.learning)?;
        let engine = Arc::new(RoutingEngine::new(
            local_id,
            neighbors,
            table,
            Arc::new(delays),
            policy,
        )?);

        let dispatcher = Arc::new(Dispatcher::new(engine.clone(), forwarder, config.dispatch_config()));
        let listener = Listener::bind(config.listen_addr, dispatcher, config.listener_config()).await?;

        Ok(Self { engine, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RouterError> {
        self.listener.local_addr()
    }

    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }

    pub fn stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    /// Serve until `shutdown` resolves; returns the final counters
    pub async fn run<F>(self, shutdown: F) -> Result<ListenerStats, RouterError>
    where
        F: Future<Output = ()>,
    {
        self.listener.serve(shutdown).await
    }
}
