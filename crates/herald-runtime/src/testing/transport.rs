use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use herald_core::transport::BoxFuture;
use herald_core::{Headers, PublishError, Transport};

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    /// Destination subject.
    pub subject: String,
    /// Raw body.
    pub body: Vec<u8>,
    /// Headers as sent.
    pub headers: Headers,
    /// Wall-clock receive time.
    pub received_at: DateTime<Utc>,
}

impl RecordedMessage {
    /// Body as UTF-8.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }

    /// Header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Transport that records every publish in memory.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    messages: Arc<Mutex<Vec<RecordedMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every message recorded so far.
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.lock().clone()
    }

    /// Messages recorded for one subject.
    pub fn messages_for(&self, subject: &str) -> Vec<RecordedMessage> {
        self.lock()
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Number of messages recorded for one subject.
    pub fn count(&self, subject: &str) -> usize {
        self.lock().iter().filter(|m| m.subject == subject).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn publish<'a>(
        &'a self,
        subject: &'a str,
        body: &'a [u8],
        headers: &'a Headers,
    ) -> BoxFuture<'a, Result<(), PublishError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PublishError::Unavailable("transport offline".to_string()));
            }

            self.lock().push(RecordedMessage {
                subject: subject.to_string(),
                body: body.to_vec(),
                headers: headers.clone(),
                received_at: Utc::now(),
            });
            Ok(())
        })
    }
}
