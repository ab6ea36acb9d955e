//! Boundary traits for the two external collaborators: the lease store used
//! for leader election and the message transport heartbeats go out on.

mod message;

pub use message::{merge_headers, HeartbeatMessage, Headers, ORIGINATOR_HEADER, SUBJECT_HEADER};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

/// Boxed future returned by the boundary traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a key-value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The key exists, or its revision moved on since it was read.
    #[error("revision conflict on key {0}")]
    Conflict(String),

    /// The key's lease ran out before the update arrived.
    #[error("key {0} expired")]
    Expired(String),

    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl KvError {
    /// Whether this error is ordinary contention rather than a failure.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Expired(_))
    }
}

/// A shared key-value bucket with revisioned writes and per-key leases.
///
/// Revisions are assigned by the store and increase monotonically. A key
/// whose lease is not renewed within its TTL is treated as absent.
pub trait KeyValueStore: Send + Sync {
    /// Write `value` under `key` only if the key is absent or expired.
    ///
    /// Returns the new revision, or [`KvError::Conflict`] if a live entry exists.
    fn create<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, KvError>>;

    /// Replace `key` only if its current revision equals `revision`,
    /// restarting the lease.
    fn update<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        revision: u64,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, KvError>>;
}

/// Errors reported by a message transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish to {subject} rejected: {reason}")]
    Rejected { subject: String, reason: String },

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Subject-addressed publishing.
pub trait Transport: Send + Sync {
    /// Publish `body` with `headers` to `subject`, resolving once acknowledged.
    fn publish<'a>(
        &'a self,
        subject: &'a str,
        body: &'a [u8],
        headers: &'a Headers,
    ) -> BoxFuture<'a, Result<(), PublishError>>;
}
