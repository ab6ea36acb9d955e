use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herald_core::election::validate_ttl;
use herald_core::{
    Backoff, CampaignEvent, ElectionState, HeraldError, KeyValueStore, KvError, Result,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::options::{ElectionObserver, ElectionOptions};
use crate::host::local_hostname;
use crate::metrics;

/// Per-run campaign bookkeeping.
#[derive(Debug, Default)]
struct Campaign {
    tick: u64,
    revision: Option<u64>,
    failures: u32,
}

/// Lease-based leader election over a shared key-value bucket.
///
/// The first contender to create the key leads; it keeps the lead by
/// renewing the key with a compare-and-swap on its last revision every
/// campaign. A leader that stops renewing (crash or cancellation) loses
/// the key when the lease runs out.
pub struct Election {
    name: String,
    key: String,
    replicator: String,
    identity: String,
    bucket: Arc<dyn KeyValueStore>,
    ttl: Duration,
    campaign_interval: Duration,
    backoff: Option<Arc<dyn Backoff>>,
    observer: Option<Arc<dyn ElectionObserver>>,
    is_leader: Arc<AtomicBool>,
    running: AtomicBool,
    state_tx: watch::Sender<ElectionState>,
}

impl Election {
    /// Create an election from options.
    pub fn new(options: ElectionOptions) -> Result<Self> {
        if options.name.is_empty() {
            return Err(HeraldError::Config("election name is required".to_string()));
        }
        if options.key.is_empty() {
            return Err(HeraldError::Config("election key is required".to_string()));
        }
        let bucket = options.bucket.ok_or_else(|| {
            HeraldError::Config("a key-value bucket is required for leader election".to_string())
        })?;
        if options.campaign_interval.is_zero() {
            return Err(HeraldError::Config(
                "campaign interval must be positive".to_string(),
            ));
        }
        if !options.test_mode.skip_ttl_validation {
            validate_ttl(options.ttl, options.campaign_interval).map_err(HeraldError::Config)?;
        }

        let backoff = if options.test_mode.disable_backoff {
            None
        } else {
            options.backoff
        };

        let host = local_hostname().unwrap_or_else(|_| "localhost".to_string());
        let identity = format!("{}@{}/{}", options.replicator, host, Uuid::new_v4());
        let (state_tx, _) = watch::channel(ElectionState::Candidate);

        Ok(Self {
            key: format!("{}.{}", options.name, options.key),
            name: options.name,
            replicator: options.replicator,
            identity,
            bucket,
            ttl: options.ttl,
            campaign_interval: options.campaign_interval,
            backoff,
            observer: options.observer,
            is_leader: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            state_tx,
        })
    }

    /// Election name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key contended for in the bucket.
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Value this contender writes while leading.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Lease duration.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Campaign period.
    pub fn campaign_interval(&self) -> Duration {
        self.campaign_interval
    }

    /// Check if this contender currently leads.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Current local state.
    pub fn state(&self) -> ElectionState {
        if self.is_leader() {
            ElectionState::Leader
        } else {
            ElectionState::Candidate
        }
    }

    /// Watch local state changes.
    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state_tx.subscribe()
    }

    /// Campaign until `cancel` fires.
    ///
    /// The key is not released on exit; other contenders take over once the
    /// lease expires.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(election = %self.name, "Election loop already running");
            return;
        }

        tracing::info!(
            election = %self.name,
            replicator = %self.replicator,
            key = %self.key,
            ttl = ?self.ttl,
            interval = ?self.campaign_interval,
            "Starting leader election"
        );

        let mut campaign = Campaign::default();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.campaign(&mut campaign) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.next_wait(&campaign)) => {}
            }
        }

        if self.is_leader() {
            tracing::info!(
                election = %self.name,
                replicator = %self.replicator,
                "Leaving election while leader, lease will expire"
            );
        } else {
            tracing::info!(election = %self.name, "Leader election shutting down");
        }
        self.set_state(ElectionState::Candidate);
        metrics::set_leader(&self.replicator, &self.name, false);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run one acquire-or-renew attempt and notify the observer.
    async fn campaign(&self, campaign: &mut Campaign) -> CampaignEvent {
        let before = self.state();
        let after = match before {
            ElectionState::Candidate => self.try_acquire(campaign).await,
            ElectionState::Leader => self.try_renew(campaign).await,
        };

        let transitioned = before != after;
        if transitioned {
            self.set_state(after);
            match after {
                ElectionState::Leader => {
                    tracing::info!(
                        election = %self.name,
                        replicator = %self.replicator,
                        "Became leader"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_won();
                    }
                }
                ElectionState::Candidate => {
                    tracing::warn!(
                        election = %self.name,
                        replicator = %self.replicator,
                        "Lost leadership"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_lost();
                    }
                }
            }
        }

        let event = CampaignEvent {
            tick: campaign.tick,
            state: after,
            transitioned,
        };
        campaign.tick += 1;

        metrics::record_campaign(&self.replicator, &self.name, after);
        if let Some(observer) = &self.observer {
            observer.on_campaign(&event);
        }

        event
    }

    async fn try_acquire(&self, campaign: &mut Campaign) -> ElectionState {
        match self
            .bucket
            .create(&self.key, self.identity.as_bytes(), self.ttl)
            .await
        {
            Ok(revision) => {
                campaign.revision = Some(revision);
                campaign.failures = 0;
                if let Some(backoff) = &self.backoff {
                    backoff.reset();
                }
                ElectionState::Leader
            }
            Err(e) => {
                self.log_failed_campaign(&e);
                campaign.failures = campaign.failures.saturating_add(1);
                ElectionState::Candidate
            }
        }
    }

    async fn try_renew(&self, campaign: &mut Campaign) -> ElectionState {
        let Some(revision) = campaign.revision else {
            return ElectionState::Candidate;
        };

        match self
            .bucket
            .update(&self.key, self.identity.as_bytes(), revision, self.ttl)
            .await
        {
            Ok(next) => {
                campaign.revision = Some(next);
                ElectionState::Leader
            }
            Err(e) => {
                tracing::warn!(
                    election = %self.name,
                    replicator = %self.replicator,
                    error = %e,
                    "Failed to renew leadership lease"
                );
                campaign.revision = None;
                campaign.failures = 0;
                ElectionState::Candidate
            }
        }
    }

    fn log_failed_campaign(&self, error: &KvError) {
        if error.is_contention() {
            tracing::debug!(
                election = %self.name,
                replicator = %self.replicator,
                "Campaign lost, key held by another contender"
            );
        } else {
            tracing::warn!(
                election = %self.name,
                replicator = %self.replicator,
                error = %error,
                "Campaign failed"
            );
        }
    }

    fn next_wait(&self, campaign: &Campaign) -> Duration {
        match (&self.backoff, self.state()) {
            (Some(backoff), ElectionState::Candidate) if campaign.failures > 0 => {
                backoff.next(campaign.failures - 1)
            }
            _ => self.campaign_interval,
        }
    }

    fn set_state(&self, state: ElectionState) {
        self.is_leader.store(state.is_leader(), Ordering::SeqCst);
        self.state_tx.send_replace(state);
    }
}

impl std::fmt::Debug for Election {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Election")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("identity", &self.identity)
            .field("ttl", &self.ttl)
            .field("campaign_interval", &self.campaign_interval)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use herald_core::election::FixedBackoff;
    use herald_core::TestMode;
    use tokio_test::assert_err;

    use super::*;
    use crate::testing::MemoryBucket;

    const TTL: Duration = Duration::from_millis(750);
    const INTERVAL: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events()
                .iter()
                .filter(|e| e.starts_with(prefix))
                .count()
        }
    }

    impl ElectionObserver for Recorder {
        fn on_won(&self) {
            self.events.lock().unwrap().push("won".to_string());
        }

        fn on_lost(&self) {
            self.events.lock().unwrap().push("lost".to_string());
        }

        fn on_campaign(&self, event: &CampaignEvent) {
            self.events.lock().unwrap().push(format!(
                "campaign:{}:{}:{}",
                event.tick, event.state, event.transitioned
            ));
        }
    }

    fn options(bucket: &MemoryBucket, replicator: &str) -> ElectionOptions {
        ElectionOptions::new("heartbeat", "leader", Arc::new(bucket.clone()))
            .with_replicator(replicator)
            .with_timing(TTL, INTERVAL)
            .with_test_mode(TestMode::enabled())
    }

    fn start(election: &Arc<Election>, cancel: &CancellationToken) -> tokio::task::JoinHandle<()> {
        let election = election.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { election.run(cancel).await })
    }

    #[test]
    fn test_new_requires_name_key_and_bucket() {
        let bucket = MemoryBucket::new();

        let mut opts = options(&bucket, "r");
        opts.name.clear();
        assert!(assert_err!(Election::new(opts)).is_config());

        let mut opts = options(&bucket, "r");
        opts.key.clear();
        assert!(assert_err!(Election::new(opts)).is_config());

        let mut opts = options(&bucket, "r");
        opts.bucket = None;
        assert!(assert_err!(Election::new(opts)).is_config());
    }

    #[test]
    fn test_new_validates_ttl_outside_test_mode() {
        let bucket = MemoryBucket::new();
        let opts = options(&bucket, "r").with_test_mode(TestMode::default());
        let err = assert_err!(Election::new(opts));
        assert!(err.is_config());

        let opts = options(&bucket, "r")
            .with_test_mode(TestMode::default())
            .with_timing(Duration::from_secs(60), Duration::from_secs(30));
        assert!(Election::new(opts).is_ok());
    }

    #[test]
    fn test_new_rejects_zero_interval_even_in_test_mode() {
        let bucket = MemoryBucket::new();
        let opts = options(&bucket, "r").with_timing(TTL, Duration::ZERO);
        assert!(assert_err!(Election::new(opts)).is_config());
    }

    #[test]
    fn test_storage_key_is_scoped_by_name() {
        let bucket = MemoryBucket::new();
        let election = Election::new(options(&bucket, "replicator_a")).unwrap();
        assert_eq!(election.storage_key(), "heartbeat.leader");
        assert!(election.identity().starts_with("replicator_a@"));
        assert_eq!(election.state(), ElectionState::Candidate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_contender_wins_once() {
        let bucket = MemoryBucket::new();
        let recorder = Arc::new(Recorder::default());
        let election = Arc::new(
            Election::new(options(&bucket, "single").with_observer(recorder.clone())).unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(election.is_leader());

        tokio::time::sleep(INTERVAL * 10).await;
        assert!(election.is_leader());
        assert_eq!(recorder.count("won"), 1);
        assert_eq!(recorder.count("lost"), 0);
        assert!(recorder.count("campaign") >= 10);

        let (value, _) = bucket.get("heartbeat.leader").unwrap();
        assert_eq!(value, election.identity().as_bytes());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_precedes_campaign_notification() {
        let bucket = MemoryBucket::new();
        let recorder = Arc::new(Recorder::default());
        let election = Arc::new(
            Election::new(options(&bucket, "ordering").with_observer(recorder.clone())).unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;
        let events = recorder.events();
        assert_eq!(events[0], "won");
        assert_eq!(events[1], "campaign:0:leader:true");
        assert_eq!(events[2], "campaign:1:leader:false");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_contenders_one_leader() {
        let bucket = MemoryBucket::new();
        let a = Arc::new(Election::new(options(&bucket, "pair_a")).unwrap());
        let b = Arc::new(Election::new(options(&bucket, "pair_b")).unwrap());
        let cancel = CancellationToken::new();
        let ha = start(&a, &cancel);
        let hb = start(&b, &cancel);

        tokio::time::sleep(INTERVAL * 20).await;
        assert_ne!(a.is_leader(), b.is_leader());

        cancel.cancel();
        ha.await.unwrap();
        hb.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_after_leader_stops() {
        let bucket = MemoryBucket::new();
        let a = Arc::new(Election::new(options(&bucket, "failover_a")).unwrap());
        let cancel_a = CancellationToken::new();
        let ha = start(&a, &cancel_a);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a.is_leader());

        let recorder = Arc::new(Recorder::default());
        let b = Arc::new(
            Election::new(options(&bucket, "failover_b").with_observer(recorder.clone())).unwrap(),
        );
        let cancel_b = CancellationToken::new();
        let hb = start(&b, &cancel_b);

        tokio::time::sleep(INTERVAL * 5).await;
        assert!(!b.is_leader());

        cancel_a.cancel();
        ha.await.unwrap();
        assert!(!a.is_leader());

        tokio::time::sleep(TTL + INTERVAL + Duration::from_millis(10)).await;
        assert!(b.is_leader());
        assert_eq!(recorder.count("won"), 1);

        cancel_b.cancel();
        hb.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_renewal_fires_on_lost() {
        let bucket = MemoryBucket::new();
        let recorder = Arc::new(Recorder::default());
        let election = Arc::new(
            Election::new(options(&bucket, "usurped").with_observer(recorder.clone())).unwrap(),
        );
        let mut state_rx = election.subscribe();
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ElectionState::Leader);

        // Someone else grabs the key between our renewals.
        bucket.expire("heartbeat.leader");
        bucket
            .create("heartbeat.leader", b"intruder", Duration::from_secs(60))
            .await
            .unwrap();

        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ElectionState::Candidate);
        assert!(!election.is_leader());
        assert_eq!(recorder.count("lost"), 1);

        let events = recorder.events();
        let lost_at = events.iter().position(|e| e == "lost").unwrap();
        assert!(events[lost_at + 1].ends_with(":candidate:true"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_keeps_candidate() {
        let bucket = MemoryBucket::new();
        bucket.set_unavailable(true);
        let election = Arc::new(Election::new(options(&bucket, "offline")).unwrap());
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(INTERVAL * 5).await;
        assert!(!election.is_leader());

        bucket.set_unavailable(false);
        tokio::time::sleep(INTERVAL * 2).await;
        assert!(election.is_leader());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_spaces_out_lost_campaigns() {
        let bucket = MemoryBucket::new();
        bucket
            .create("heartbeat.leader", b"someone", Duration::from_secs(3600))
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let opts = options(&bucket, "backoff")
            .with_test_mode(TestMode {
                skip_ttl_validation: true,
                disable_backoff: false,
            })
            .with_backoff(Arc::new(FixedBackoff::new(Duration::from_secs(1))))
            .with_observer(recorder.clone());
        let election = Arc::new(Election::new(opts).unwrap());
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(Duration::from_millis(2050)).await;
        let campaigns = recorder.count("campaign");
        assert!((2..=3).contains(&campaigns), "{} campaigns", campaigns);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_backoff_uses_base_interval() {
        let bucket = MemoryBucket::new();
        bucket
            .create("heartbeat.leader", b"someone", Duration::from_secs(3600))
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let opts = options(&bucket, "no_backoff")
            .with_backoff(Arc::new(FixedBackoff::new(Duration::from_secs(1))))
            .with_observer(recorder.clone());
        let election = Arc::new(Election::new(opts).unwrap());
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(recorder.count("campaign") >= 10);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_gauge_cleared_on_shutdown() {
        let bucket = MemoryBucket::new();
        let election = Arc::new(Election::new(options(&bucket, "gauge_leader")).unwrap());
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(election.is_leader());
        assert_eq!(metrics::leader("gauge_leader", "heartbeat"), 1);

        cancel.cancel();
        handle.await.unwrap();
        assert!(!election.is_leader());
        assert_eq!(metrics::leader("gauge_leader", "heartbeat"), 0);

        tokio::time::sleep(TTL * 2).await;
        assert_eq!(metrics::leader("gauge_leader", "heartbeat"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_renewal_returns_to_base_interval() {
        let bucket = MemoryBucket::new();
        bucket
            .create("heartbeat.leader", b"someone", Duration::from_millis(1500))
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let opts = options(&bucket, "backoff_reset")
            .with_test_mode(TestMode {
                skip_ttl_validation: true,
                disable_backoff: false,
            })
            .with_backoff(Arc::new(FixedBackoff::new(Duration::from_secs(1))))
            .with_observer(recorder.clone());
        let election = Arc::new(Election::new(opts).unwrap());
        let mut state_rx = election.subscribe();
        let cancel = CancellationToken::new();
        let handle = start(&election, &cancel);

        // Loses at 0s and 1s, wins at 2s once the squatter's lease is gone.
        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ElectionState::Leader);
        assert_eq!(recorder.count("campaign"), 3);

        bucket.expire("heartbeat.leader");
        bucket
            .create("heartbeat.leader", b"intruder", Duration::from_secs(3600))
            .await
            .unwrap();

        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ElectionState::Candidate);
        let after_loss = recorder.count("campaign");

        // Next attempt follows the base interval, not the 1s backoff.
        tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;
        assert_eq!(recorder.count("campaign"), after_loss + 1);

        // That attempt loses, so backoff applies again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.count("campaign"), after_loss + 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_ignored() {
        let bucket = MemoryBucket::new();
        let election = Arc::new(Election::new(options(&bucket, "twice")).unwrap());
        let cancel = CancellationToken::new();
        let first = start(&election, &cancel);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Returns straight away without touching the running loop.
        election.run(cancel.clone()).await;
        assert!(election.is_leader());

        cancel.cancel();
        first.await.unwrap();
    }
}
