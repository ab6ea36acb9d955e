//! herald - leader-gated heartbeat publishing.
//!
//! A set of replicators share a key-value bucket and elect one of
//! themselves; only that instance publishes heartbeats on the configured
//! subjects. Losing the lease pauses publication until it is won back.

#[doc(hidden)]
pub use herald_core;
#[doc(hidden)]
pub use herald_runtime;

pub use herald_core::{HeraldError, Result};
pub use herald_runtime::metrics::gather_text as gather_metrics;
pub use herald_runtime::{Election, ElectionOptions, HeartbeatPublisher};

pub mod prelude {
    pub use herald_core::election::{ExponentialBackoff, FixedBackoff, Jittered};
    pub use herald_core::{
        Backoff, CampaignEvent, ElectionConfig, ElectionState, Headers, HeartbeatConfig,
        HeartbeatMessage, HeraldError, KeyValueStore, KvError, PublishError, Result,
        SubjectConfig, TestMode, Transport,
    };
    pub use herald_runtime::{
        Election, ElectionObserver, ElectionOptions, HeartbeatPublisher, MemoryBucket,
        MemoryTransport,
    };
    pub use tokio_util::sync::CancellationToken;
    pub use tokio_util::task::TaskTracker;
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `level` when unset.
pub fn init_tracing(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()))
        .try_init()
        .map_err(|e| HeraldError::Setup(format!("Failed to initialise tracing: {}", e)))
}
