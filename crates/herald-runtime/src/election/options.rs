use std::sync::Arc;
use std::time::Duration;

use herald_core::{Backoff, CampaignEvent, KeyValueStore, TestMode};

/// Receives election notifications, in order, from the campaign loop.
///
/// For a given campaign, `on_won` or `on_lost` (if the state changed) is
/// called before `on_campaign`. Implementations must not block.
pub trait ElectionObserver: Send + Sync {
    /// Candidate became Leader.
    fn on_won(&self) {}

    /// Leader became Candidate, voluntarily or not.
    fn on_lost(&self) {}

    /// A campaign finished; called every tick.
    fn on_campaign(&self, _event: &CampaignEvent) {}
}

/// Election construction parameters.
#[derive(Clone)]
pub struct ElectionOptions {
    /// Election name shared by all contenders.
    pub name: String,
    /// Key inside the bucket; stored as `{name}.{key}`.
    pub key: String,
    /// Replicator label for logs and metrics.
    pub replicator: String,
    /// Shared lease store.
    pub bucket: Option<Arc<dyn KeyValueStore>>,
    /// Lease duration.
    pub ttl: Duration,
    /// Campaign period.
    pub campaign_interval: Duration,
    /// Wait strategy while losing campaigns.
    pub backoff: Option<Arc<dyn Backoff>>,
    /// State change listener.
    pub observer: Option<Arc<dyn ElectionObserver>>,
    /// Test-only switches.
    pub test_mode: TestMode,
}

impl Default for ElectionOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: String::new(),
            replicator: String::new(),
            bucket: None,
            ttl: Duration::from_secs(30),
            campaign_interval: Duration::from_secs(15),
            backoff: None,
            observer: None,
            test_mode: TestMode::default(),
        }
    }
}

impl ElectionOptions {
    /// Options for contending on `key` of election `name` in `bucket`.
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        bucket: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            bucket: Some(bucket),
            ..Default::default()
        }
    }

    /// Set the replicator label.
    pub fn with_replicator(mut self, replicator: impl Into<String>) -> Self {
        self.replicator = replicator.into();
        self
    }

    /// Set the lease duration and campaign period.
    pub fn with_timing(mut self, ttl: Duration, campaign_interval: Duration) -> Self {
        self.ttl = ttl;
        self.campaign_interval = campaign_interval;
        self
    }

    /// Back off between lost campaigns.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Listen for state changes.
    pub fn with_observer(mut self, observer: Arc<dyn ElectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Apply test-only switches.
    pub fn with_test_mode(mut self, test_mode: TestMode) -> Self {
        self.test_mode = test_mode;
        self
    }
}

impl std::fmt::Debug for ElectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectionOptions")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("replicator", &self.replicator)
            .field("bucket", &self.bucket.is_some())
            .field("ttl", &self.ttl)
            .field("campaign_interval", &self.campaign_interval)
            .field("backoff", &self.backoff.is_some())
            .field("observer", &self.observer.is_some())
            .field("test_mode", &self.test_mode)
            .finish()
    }
}
