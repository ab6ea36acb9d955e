use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use herald_core::election::{ExponentialBackoff, Jittered};
use herald_core::transport::merge_headers;
use herald_core::{
    CampaignEvent, Headers, HeartbeatConfig, HeartbeatMessage, HeraldError, KeyValueStore,
    Result, TestMode, Transport,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::election::{Election, ElectionObserver, ElectionOptions};
use crate::host::local_hostname;
use crate::metrics;

/// A subject with its parsed cadence and merged headers.
#[derive(Debug, Clone)]
struct Schedule {
    subject: String,
    interval: Duration,
    headers: Headers,
}

/// Publishes periodic heartbeats on every configured subject.
///
/// With leader election enabled, only the instance holding the election
/// publishes; the others keep campaigning and resume as soon as they win.
pub struct HeartbeatPublisher {
    replicator: String,
    hostname: String,
    schedules: Vec<Schedule>,
    transport: Arc<dyn Transport>,
    election: Option<Arc<Election>>,
    paused: Arc<AtomicBool>,
    started: AtomicBool,
}

impl HeartbeatPublisher {
    /// Create a publisher.
    ///
    /// `bucket` is required when `config.leader_election` is set.
    pub fn new(
        config: &HeartbeatConfig,
        replicator: impl Into<String>,
        transport: Arc<dyn Transport>,
        bucket: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self> {
        Self::with_test_mode(config, replicator, transport, bucket, TestMode::default())
    }

    /// Create a publisher with test-only switches applied to its election.
    pub fn with_test_mode(
        config: &HeartbeatConfig,
        replicator: impl Into<String>,
        transport: Arc<dyn Transport>,
        bucket: Option<Arc<dyn KeyValueStore>>,
        test_mode: TestMode,
    ) -> Result<Self> {
        config.validate()?;
        metrics::init();

        let replicator = replicator.into();
        let schedules = config
            .subjects
            .iter()
            .map(|s| {
                Ok(Schedule {
                    subject: s.name.clone(),
                    interval: s.interval()?,
                    headers: merge_headers(&config.headers, &s.headers),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let paused = Arc::new(AtomicBool::new(config.leader_election));

        let election = if config.leader_election {
            let ttl = config.election.ttl()?;
            let campaign_interval = config.election.campaign_interval()?;
            let gate = LeadershipGate {
                replicator: replicator.clone(),
                subjects: schedules.iter().map(|s| s.subject.clone()).collect(),
                paused: paused.clone(),
            };

            let options = ElectionOptions {
                name: config.election.name.clone(),
                key: config.election.key.clone(),
                replicator: replicator.clone(),
                bucket,
                ttl,
                campaign_interval,
                backoff: Some(Arc::new(Jittered::new(ExponentialBackoff::new(
                    campaign_interval,
                    campaign_interval * 2,
                )))),
                observer: Some(Arc::new(gate)),
                test_mode,
            };

            Some(Arc::new(Election::new(options)?))
        } else {
            None
        };

        Ok(Self {
            replicator,
            hostname: local_hostname()?,
            schedules,
            transport,
            election,
            paused,
            started: AtomicBool::new(false),
        })
    }

    /// Replicator this publisher reports as.
    pub fn replicator(&self) -> &str {
        &self.replicator
    }

    /// Configured subject names, in order.
    pub fn subjects(&self) -> Vec<&str> {
        self.schedules.iter().map(|s| s.subject.as_str()).collect()
    }

    /// Whether publication is currently suppressed.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// The election gating this publisher, if enabled.
    pub fn election(&self) -> Option<&Arc<Election>> {
        self.election.as_ref()
    }

    /// Spawn the publish tasks (and the election loop) on `tracker`.
    ///
    /// Returns once everything is spawned. Every task stops when `cancel`
    /// fires; close and wait on the tracker for an orderly shutdown.
    pub fn run(&self, cancel: CancellationToken, tracker: &TaskTracker) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HeraldError::InvalidState(format!(
                "heartbeat publisher {} is already running",
                self.replicator
            )));
        }

        let gated = self.election.is_some();
        metrics::set_paused(&self.replicator, gated);

        if let Some(election) = &self.election {
            for schedule in &self.schedules {
                metrics::set_subject_active(&self.replicator, &schedule.subject, false);
            }

            let election = election.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move { election.run(cancel).await });
        }

        for schedule in &self.schedules {
            let task = SubjectTask {
                schedule: schedule.clone(),
                replicator: self.replicator.clone(),
                hostname: self.hostname.clone(),
                transport: self.transport.clone(),
                paused: gated.then(|| self.paused.clone()),
            };
            tracker.spawn(task.run(cancel.clone()));
        }

        let replicator = self.replicator.clone();
        let paused = self.paused.clone();
        tracker.spawn(async move {
            cancel.cancelled().await;
            paused.store(true, Ordering::SeqCst);
            metrics::set_paused(&replicator, true);
            tracing::info!(replicator = %replicator, "Heartbeat publisher stopped");
        });

        tracing::info!(
            replicator = %self.replicator,
            subjects = self.schedules.len(),
            leader_election = gated,
            "Heartbeat publisher started"
        );

        Ok(())
    }

    /// Run until `cancel` fires and every task has exited.
    pub async fn run_until_stopped(&self, cancel: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();
        self.run(cancel.clone(), &tracker)?;
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

/// Flips the paused flag and gauges from election notifications.
struct LeadershipGate {
    replicator: String,
    subjects: Vec<String>,
    paused: Arc<AtomicBool>,
}

impl ElectionObserver for LeadershipGate {
    fn on_won(&self) {
        self.paused.store(false, Ordering::SeqCst);
        metrics::set_paused(&self.replicator, false);
        tracing::info!(replicator = %self.replicator, "Resuming heartbeats");
    }

    fn on_lost(&self) {
        self.paused.store(true, Ordering::SeqCst);
        metrics::set_paused(&self.replicator, true);
        tracing::warn!(replicator = %self.replicator, "Pausing heartbeats");
    }

    fn on_campaign(&self, event: &CampaignEvent) {
        let active = event.state.is_leader();
        for subject in &self.subjects {
            metrics::set_subject_active(&self.replicator, subject, active);
        }
    }
}

/// Publish loop for one subject.
struct SubjectTask {
    schedule: Schedule,
    replicator: String,
    hostname: String,
    transport: Arc<dyn Transport>,
    /// Shared paused flag, present only when leader election gates publishing.
    paused: Option<Arc<AtomicBool>>,
}

impl SubjectTask {
    async fn run(self, cancel: CancellationToken) {
        let subject = self.schedule.subject.as_str();
        if self.paused.is_none() {
            metrics::set_subject_active(&self.replicator, subject, true);
        }

        tracing::debug!(
            replicator = %self.replicator,
            subject = %subject,
            interval = ?self.schedule.interval,
            "Starting heartbeat loop"
        );

        let start = tokio::time::Instant::now() + self.schedule.interval;
        let mut ticker = tokio::time::interval_at(start, self.schedule.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.is_paused() {
                tracing::trace!(subject = %subject, "Paused, skipping heartbeat");
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.publish() => {}
            }
        }

        metrics::set_subject_active(&self.replicator, subject, false);
        tracing::debug!(replicator = %self.replicator, subject = %subject, "Heartbeat loop stopped");
    }

    fn is_paused(&self) -> bool {
        self.paused
            .as_ref()
            .is_some_and(|p| p.load(Ordering::SeqCst))
    }

    async fn publish(&self) {
        let message = HeartbeatMessage::new(
            self.schedule.subject.as_str(),
            &self.hostname,
            &self.schedule.headers,
            Utc::now(),
        );

        match self
            .transport
            .publish(&message.subject, message.payload(), &message.headers)
            .await
        {
            Ok(()) => {
                metrics::record_published(&self.replicator, &message.subject);
                tracing::trace!(subject = %message.subject, body = %message.body, "Published heartbeat");
            }
            Err(e) => {
                metrics::record_publish_error(&self.replicator, &message.subject);
                tracing::warn!(
                    replicator = %self.replicator,
                    subject = %message.subject,
                    error = %e,
                    "Failed to publish heartbeat"
                );
            }
        }
    }
}
