//! Health probe configuration types.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StagehandError};

/// Default bounds for health probes.
///
/// A service's `health` section may override any of these per check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Seconds between probe attempts.
    pub interval_seconds: u64,

    /// Total seconds a check may take before it times out.
    pub timeout_seconds: u64,

    /// Failed attempts tolerated before a service is unhealthy.
    pub retries: u32,

    /// Per-attempt HTTP request timeout in seconds.
    pub http_seconds: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 2,
            timeout_seconds: 60,
            retries: 3,
            http_seconds: 5,
        }
    }
}

impl ProbeConfig {
    /// Validates the probe defaults.
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(StagehandError::config("probe.interval_seconds must be > 0"));
        }
        if self.timeout_seconds == 0 {
            return Err(StagehandError::config("probe.timeout_seconds must be > 0"));
        }
        if self.retries == 0 {
            return Err(StagehandError::config("probe.retries must be > 0"));
        }
        if self.http_seconds == 0 {
            return Err(StagehandError::config("probe.http_seconds must be > 0"));
        }
        Ok(())
    }
}
