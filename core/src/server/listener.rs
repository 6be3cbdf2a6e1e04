//! Listener: accepts connections and hands each one to its own task
//!
//! Concurrency is capped by a semaphore; every handler is tracked in a
//! `JoinSet` so shutdown can stop accepting and then wait for in-flight
//! connections. A failing or panicking handler never stops the accept loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::stats::ListenerStats;
use crate::RouterError;

/// Default cap on concurrently handled connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Maximum connections handled at once; further accepts wait for a slot
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

pub struct Listener {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
}

impl Listener {
    /// Bind to `addr`; port 0 picks an ephemeral port
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        config: ListenerConfig,
    ) -> Result<Self, RouterError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RouterError::Bind { addr, source })?;
        Ok(Self {
            listener,
            dispatcher,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RouterError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> ListenerStats {
        self.dispatcher.stats().snapshot()
    }

    /// Accept until `shutdown` resolves, then drain in-flight handlers
    pub async fn serve<F>(self, shutdown: F) -> Result<ListenerStats, RouterError>
    where
        F: Future<Output = ()>,
    {
        let local = self.local_addr()?;
        tracing::info!("Listening for packets on {}", local);

        let mut handlers: JoinSet<DispatchOutcome> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            // Wait for a free slot before accepting, so excess connections
            // queue in the kernel backlog instead of piling up as tasks
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let dispatcher = self.dispatcher.clone();
                    handlers.spawn(async move {
                        let outcome = dispatcher.handle_connection(stream, peer).await;
                        drop(permit);
                        outcome
                    });
                }
                Err(e) => {
                    drop(permit);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = accept_backoff(local, &e) => {}
                    }
                }
            }

            // Reap finished handlers so the set does not grow unbounded
            while let Some(joined) = handlers.try_join_next() {
                log_join(joined);
            }
        }

        tracing::info!(
            "Listener on {} shutting down, waiting for {} connection(s)",
            local,
            handlers.len()
        );
        while let Some(joined) = handlers.join_next().await {
            log_join(joined);
        }

        Ok(self.dispatcher.stats().snapshot())
    }
}

async fn accept_backoff(local: SocketAddr, err: &io::Error) {
    tracing::warn!(
        "Accept failed on {}: {}; retrying in {:?}",
        local,
        err,
        ACCEPT_ERROR_BACKOFF
    );
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

fn log_join(joined: Result<DispatchOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => tracing::trace!("Connection finished: {:?}", outcome),
        Err(e) if e.is_panic() => tracing::error!("Connection handler panicked: {}", e),
        Err(e) => tracing::debug!("Connection handler cancelled: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{LinkDelayCache, ProbeConfig};
    use crate::routing::{LearningParams, NeighborTable, NodeId, Policy, RoutingEngine, ValueTable};
    use crate::server::dispatcher::DispatchConfig;
    use crate::transport::TcpForwarder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn sink_dispatcher() -> Arc<Dispatcher> {
        let local = NodeId::from("E");
        let neighbors = NeighborTable::new(&local, Vec::new()).unwrap();
        let table = ValueTable::for_neighbors(&local, &neighbors);
        let delays = Arc::new(LinkDelayCache::new(&ProbeConfig::default()));
        let policy = Policy::new(LearningParams::default()).unwrap();
        let engine = Arc::new(RoutingEngine::new(local, neighbors, table, delays, policy).unwrap());
        Arc::new(Dispatcher::new(
            engine,
            Arc::new(TcpForwarder::default()),
            DispatchConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_serve_answers_probes_until_shutdown() {
        let listener = Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            sink_dispatcher(),
            ListenerConfig::default(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(listener.serve(async move {
            let _ = stop_rx.await;
        }));

        for _ in 0..3 {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(b"ping").await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            assert_eq!(reply, b"pong");
        }

        stop_tx.send(()).unwrap();
        let stats = server.await.unwrap().unwrap();
        assert_eq!(stats.probes_answered, 3);
        assert_eq!(stats.connections_accepted, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off_before_retry() {
        let local: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        let err = io::Error::new(io::ErrorKind::Other, "too many open files");

        let started = tokio::time::Instant::now();
        accept_backoff(local, &err).await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            sink_dispatcher(),
            ListenerConfig::default(),
        )
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();

        let second = Listener::bind(taken, sink_dispatcher(), ListenerConfig::default()).await;
        assert!(matches!(second, Err(RouterError::Bind { .. })));
    }
}
