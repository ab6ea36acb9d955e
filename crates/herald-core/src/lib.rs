//! Core types for herald: configuration, errors, election state and
//! backoff strategies, and the traits for the external key-value store
//! and message transport.

pub mod config;
pub mod election;
pub mod error;
pub mod transport;

pub use config::{ElectionConfig, HeartbeatConfig, SubjectConfig};
pub use election::{Backoff, CampaignEvent, ElectionState, TestMode};
pub use error::{HeraldError, Result};
pub use transport::{Headers, HeartbeatMessage, KeyValueStore, KvError, PublishError, Transport};
