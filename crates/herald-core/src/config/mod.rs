mod duration;
mod election;

pub use duration::parse_duration;
pub use election::ElectionConfig;

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{HeraldError, Result};
use crate::transport::Headers;

/// Heartbeat publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Only publish while this instance holds the election.
    #[serde(default)]
    pub leader_election: bool,

    /// Transport endpoint.
    #[serde(default)]
    pub url: String,

    /// Headers added to every heartbeat.
    #[serde(default)]
    pub headers: Headers,

    /// Subjects to publish on, each with its own cadence.
    #[serde(default)]
    pub subjects: Vec<SubjectConfig>,

    /// Election settings, used when `leader_election` is set.
    #[serde(default)]
    pub election: ElectionConfig,
}

/// A subject to publish heartbeats on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectConfig {
    /// Subject name.
    pub name: String,

    /// Publish interval, e.g. `"10s"`.
    pub interval: String,

    /// Headers for this subject only, merged over the global ones.
    #[serde(default)]
    pub headers: Headers,
}

impl SubjectConfig {
    /// Create a subject without extra headers.
    pub fn new(name: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: interval.into(),
            headers: Headers::new(),
        }
    }

    /// Parsed publish interval; must be positive.
    pub fn interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.interval).map_err(|e| match e {
            HeraldError::Config(msg) => {
                HeraldError::Config(format!("subject {}: {}", self.name, msg))
            }
            other => other,
        })?;

        if interval.is_zero() {
            return Err(HeraldError::Config(format!(
                "subject {}: interval must be positive",
                self.name
            )));
        }

        Ok(interval)
    }
}

impl HeartbeatConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every subject and, when enabled, the election timings.
    pub fn validate(&self) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(HeraldError::Config(
                "at least one heartbeat subject is required".to_string(),
            ));
        }

        for subject in &self.subjects {
            if subject.name.trim().is_empty() {
                return Err(HeraldError::Config(
                    "heartbeat subject name cannot be empty".to_string(),
                ));
            }
            subject.interval()?;
        }

        if self.leader_election {
            self.election.ttl()?;
            self.election.campaign_interval()?;
        }

        Ok(())
    }
}

static ENV_VAR: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replace `${VAR}` with the value of the environment variable, leaving
/// unknown variables untouched.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex_lite::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
