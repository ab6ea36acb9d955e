use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration::parse_duration;
use crate::error::Result;

/// Leader election settings for the heartbeat publisher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Election name shared by every contender.
    #[serde(default = "default_name")]
    pub name: String,

    /// Key contended for inside the bucket.
    #[serde(default = "default_key")]
    pub key: String,

    /// Lease duration.
    #[serde(default = "default_ttl")]
    pub ttl: String,

    /// Campaign period; half the lease when unset.
    #[serde(default)]
    pub campaign_interval: Option<String>,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            key: default_key(),
            ttl: default_ttl(),
            campaign_interval: None,
        }
    }
}

impl ElectionConfig {
    /// Parsed lease duration.
    pub fn ttl(&self) -> Result<Duration> {
        parse_duration(&self.ttl)
    }

    /// Parsed campaign interval.
    pub fn campaign_interval(&self) -> Result<Duration> {
        match &self.campaign_interval {
            Some(interval) => parse_duration(interval),
            None => Ok(self.ttl()? / 2),
        }
    }
}

fn default_name() -> String {
    "heartbeat".to_string()
}

fn default_key() -> String {
    "leader".to_string()
}

fn default_ttl() -> String {
    "30s".to_string()
}
