//! Inbound side of the router
//!
//! - [`listener`]: accept loop, bounded concurrency, graceful shutdown
//! - [`dispatcher`]: per-connection probe-reply / route / forward cycle
//! - [`stats`]: counters shared by all handlers

pub mod dispatcher;
pub mod listener;
pub mod stats;

pub use dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher, ProbeReplyMode};
pub use listener::{Listener, ListenerConfig, ACCEPT_ERROR_BACKOFF, DEFAULT_MAX_CONNECTIONS};
pub use stats::{ListenerStats, StatsRecorder};
