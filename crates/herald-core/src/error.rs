use thiserror::Error;

/// Core error type for herald operations.
#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for HeraldError {
    fn from(e: toml::de::Error) -> Self {
        HeraldError::Config(format!("Failed to parse config: {}", e))
    }
}

impl HeraldError {
    /// Whether the error came from invalid construction parameters.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias using HeraldError.
pub type Result<T> = std::result::Result<T, HeraldError>;
