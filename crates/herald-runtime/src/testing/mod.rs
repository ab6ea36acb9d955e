//! In-process store and transport.
//!
//! Used by the test suites, and usable for single-process deployments
//! where election is trivially local.

mod bucket;
mod transport;

pub use bucket::MemoryBucket;
pub use transport::{MemoryTransport, RecordedMessage};
