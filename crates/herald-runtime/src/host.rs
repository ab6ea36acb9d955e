use herald_core::{HeraldError, Result};

/// Hostname of the local machine.
pub fn local_hostname() -> Result<String> {
    hostname::get()
        .map_err(|e| HeraldError::Setup(format!("Failed to look up hostname: {}", e)))?
        .into_string()
        .map_err(|_| HeraldError::Setup("hostname is not valid UTF-8".to_string()))
}
