//! Periodic heartbeat publication, optionally gated by leader election.

mod publisher;

pub use publisher::HeartbeatPublisher;
