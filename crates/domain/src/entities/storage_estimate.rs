//! Storage usage as reported by the platform

use serde::{Deserialize, Serialize};

/// Raw usage and quota figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageEstimate {
    /// Bytes in use
    pub usage_bytes: u64,
    /// Bytes available to this installation
    pub quota_bytes: u64,
}

impl StorageEstimate {
    /// Unclamped usage percentage, `None` when the quota is unknown
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_percent(&self) -> Option<f64> {
        (self.quota_bytes > 0)
            .then(|| self.usage_bytes as f64 / self.quota_bytes as f64 * 100.0)
    }
}

/// Storage summary for display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageReport {
    /// Raw platform estimate
    pub estimate: StorageEstimate,
    /// Usage percentage clamped to 0..=100
    pub usage_percent: f64,
    /// Bytes held by the entity cache
    pub cache_bytes: u64,
    /// Configured cache ceiling in bytes
    pub cache_limit_bytes: u64,
    /// Persistence grant, if it was requested this session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
}

impl StorageReport {
    /// Build a report; only the display percentage is clamped
    pub fn new(
        estimate: StorageEstimate,
        cache_bytes: u64,
        cache_limit_bytes: u64,
        persisted: Option<bool>,
    ) -> Self {
        let usage_percent = estimate.usage_percent().unwrap_or(0.0).clamp(0.0, 100.0);
        Self {
            estimate,
            usage_percent,
            cache_bytes,
            cache_limit_bytes,
            persisted,
        }
    }
}
