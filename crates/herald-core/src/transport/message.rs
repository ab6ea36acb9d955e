use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Message headers.
pub type Headers = BTreeMap<String, String>;

/// Header carrying the hostname of the publishing instance.
pub const ORIGINATOR_HEADER: &str = "Originator";

/// Header carrying the subject the heartbeat was published to.
pub const SUBJECT_HEADER: &str = "Subject";

/// Merge subject-level headers over the global ones.
///
/// Subject entries win when both define the same key.
pub fn merge_headers(global: &Headers, subject: &Headers) -> Headers {
    let mut merged = global.clone();
    merged.extend(subject.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// A single heartbeat as it goes out on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMessage {
    /// Destination subject.
    pub subject: String,
    /// Decimal Unix timestamp in seconds.
    pub body: String,
    /// Custom headers plus `Originator` and `Subject`.
    pub headers: Headers,
}

impl HeartbeatMessage {
    /// Build a heartbeat stamped with `at`.
    ///
    /// `Originator` and `Subject` are reserved and always reflect the
    /// publishing host and destination, even if `custom` names them.
    pub fn new(
        subject: impl Into<String>,
        originator: &str,
        custom: &Headers,
        at: DateTime<Utc>,
    ) -> Self {
        let subject = subject.into();
        let mut headers = custom.clone();
        headers.insert(ORIGINATOR_HEADER.to_string(), originator.to_string());
        headers.insert(SUBJECT_HEADER.to_string(), subject.clone());

        Self {
            body: at.timestamp().to_string(),
            subject,
            headers,
        }
    }

    /// The body parsed back into a Unix timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.body.parse().ok()
    }

    /// Body bytes for the transport.
    pub fn payload(&self) -> &[u8] {
        self.body.as_bytes()
    }
}
