//! Leader election on a shared lease bucket.

mod engine;
mod options;

pub use engine::Election;
pub use options::{ElectionObserver, ElectionOptions};
