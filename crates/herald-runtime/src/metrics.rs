//! Prometheus series for heartbeat publication and leader election.
//!
//! Series are process-wide and labelled by replicator, so several
//! publishers in one process keep separate values.

use std::sync::Once;

use herald_core::{ElectionState, HeraldError, Result};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

static INIT: Once = Once::new();

lazy_static! {
    /// Registry holding every herald series.
    pub static ref REGISTRY: Registry = Registry::new();

    /// 1 while the replicator is publishing on the subject.
    pub static ref HB_SUBJECTS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("herald_heartbeat_subjects", "Subjects currently receiving heartbeats"),
        &["replicator", "subject"]
    ).expect("metric can be created");

    /// 1 while the replicator is paused.
    pub static ref HB_PAUSED: IntGaugeVec = IntGaugeVec::new(
        Opts::new("herald_heartbeat_paused", "Whether heartbeat publication is paused"),
        &["replicator"]
    ).expect("metric can be created");

    /// Successful heartbeat publishes.
    pub static ref HB_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("herald_heartbeat_published_total", "Heartbeats published"),
        &["replicator", "subject"]
    ).expect("metric can be created");

    /// Failed heartbeat publishes.
    pub static ref HB_PUBLISH_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("herald_heartbeat_publish_errors_total", "Heartbeat publish failures"),
        &["replicator", "subject"]
    ).expect("metric can be created");

    /// Campaigns run, by resulting state.
    pub static ref ELECTION_CAMPAIGNS: IntCounterVec = IntCounterVec::new(
        Opts::new("herald_election_campaigns_total", "Leader election campaigns"),
        &["replicator", "election", "state"]
    ).expect("metric can be created");

    /// 1 while the replicator holds the election.
    pub static ref ELECTION_LEADER: IntGaugeVec = IntGaugeVec::new(
        Opts::new("herald_election_leader", "Whether this instance is the elected leader"),
        &["replicator", "election"]
    ).expect("metric can be created");
}

/// Register every series with [`REGISTRY`]. Safe to call repeatedly.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HB_SUBJECTS.clone()))
            .expect("heartbeat_subjects can be registered");
        REGISTRY
            .register(Box::new(HB_PAUSED.clone()))
            .expect("heartbeat_paused can be registered");
        REGISTRY
            .register(Box::new(HB_PUBLISHED.clone()))
            .expect("heartbeat_published_total can be registered");
        REGISTRY
            .register(Box::new(HB_PUBLISH_ERRORS.clone()))
            .expect("heartbeat_publish_errors_total can be registered");
        REGISTRY
            .register(Box::new(ELECTION_CAMPAIGNS.clone()))
            .expect("election_campaigns_total can be registered");
        REGISTRY
            .register(Box::new(ELECTION_LEADER.clone()))
            .expect("election_leader can be registered");
    });
}

/// Encode the registry in the Prometheus text format.
pub fn gather_text() -> Result<String> {
    init();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| HeraldError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| HeraldError::Metrics(e.to_string()))
}

pub(crate) fn set_subject_active(replicator: &str, subject: &str, active: bool) {
    HB_SUBJECTS
        .with_label_values(&[replicator, subject])
        .set(active as i64);
}

pub(crate) fn set_paused(replicator: &str, paused: bool) {
    HB_PAUSED.with_label_values(&[replicator]).set(paused as i64);
}

pub(crate) fn record_published(replicator: &str, subject: &str) {
    HB_PUBLISHED.with_label_values(&[replicator, subject]).inc();
}

pub(crate) fn record_publish_error(replicator: &str, subject: &str) {
    HB_PUBLISH_ERRORS
        .with_label_values(&[replicator, subject])
        .inc();
}

pub(crate) fn record_campaign(replicator: &str, election: &str, state: ElectionState) {
    ELECTION_CAMPAIGNS
        .with_label_values(&[replicator, election, state.as_str()])
        .inc();
    set_leader(replicator, election, state.is_leader());
}

pub(crate) fn set_leader(replicator: &str, election: &str, leader: bool) {
    ELECTION_LEADER
        .with_label_values(&[replicator, election])
        .set(leader as i64);
}

/// Current `herald_election_leader` value.
pub fn leader(replicator: &str, election: &str) -> i64 {
    ELECTION_LEADER
        .with_label_values(&[replicator, election])
        .get()
}

/// Current `herald_heartbeat_subjects` value.
pub fn subject_active(replicator: &str, subject: &str) -> i64 {
    HB_SUBJECTS.with_label_values(&[replicator, subject]).get()
}

/// Current `herald_heartbeat_paused` value.
pub fn paused(replicator: &str) -> i64 {
    HB_PAUSED.with_label_values(&[replicator]).get()
}

/// Current `herald_heartbeat_published_total` value.
pub fn published(replicator: &str, subject: &str) -> u64 {
    HB_PUBLISHED.with_label_values(&[replicator, subject]).get()
}

/// Current `herald_heartbeat_publish_errors_total` value.
pub fn publish_errors(replicator: &str, subject: &str) -> u64 {
    HB_PUBLISH_ERRORS
        .with_label_values(&[replicator, subject])
        .get()
}
