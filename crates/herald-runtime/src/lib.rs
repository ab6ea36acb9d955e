//! Runtime for herald: the leader election loop, the heartbeat publisher,
//! Prometheus series and in-memory backends.

pub mod election;
pub mod heartbeat;
pub mod host;
pub mod metrics;
pub mod testing;

pub use election::{Election, ElectionObserver, ElectionOptions};
pub use heartbeat::HeartbeatPublisher;
pub use host::local_hostname;
pub use testing::{MemoryBucket, MemoryTransport, RecordedMessage};
