mod backoff;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff, Jittered};

use std::time::Duration;

/// Smallest lease accepted outside of test mode.
pub const MIN_TTL: Duration = Duration::from_secs(30);

/// Local view of an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElectionState {
    /// Not holding the key; campaigning to acquire it.
    #[default]
    Candidate,
    /// Holding the key; renewing it every campaign.
    Leader,
}

impl ElectionState {
    /// Convert to string for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Leader => "leader",
        }
    }

    /// Check if this is the leader state.
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader)
    }
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single campaign tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignEvent {
    /// Zero-based campaign counter.
    pub tick: u64,
    /// State after this campaign was applied.
    pub state: ElectionState,
    /// Whether this campaign changed the state.
    pub transitioned: bool,
}

/// Switches intended for test harnesses only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TestMode {
    /// Accept leases shorter than [`MIN_TTL`] or close to the campaign interval.
    pub skip_ttl_validation: bool,
    /// Campaign at the base interval even under contention.
    pub disable_backoff: bool,
}

impl TestMode {
    /// Both switches on.
    pub fn enabled() -> Self {
        Self {
            skip_ttl_validation: true,
            disable_backoff: true,
        }
    }
}

/// Check that a lease leaves enough headroom over the renewal cadence.
///
/// The lease must be at least [`MIN_TTL`] and the campaign interval at most
/// three quarters of it.
pub fn validate_ttl(ttl: Duration, campaign_interval: Duration) -> Result<(), String> {
    if ttl < MIN_TTL {
        return Err(format!(
            "lease TTL {:?} is shorter than the minimum of {:?}",
            ttl, MIN_TTL
        ));
    }

    if campaign_interval.is_zero() || campaign_interval * 4 > ttl * 3 {
        return Err(format!(
            "campaign interval {:?} must be positive and at most 75% of the lease TTL {:?}",
            campaign_interval, ttl
        ));
    }

    Ok(())
}
