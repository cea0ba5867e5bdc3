use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs that tune the job processor.
///
/// All fields carry defaults so deployments only spell out what they change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Lease, backoff and deadline for per-job mutexes.
    pub mutex: MutexConfig,
    /// Retention sweep settings.
    pub cleanup: CleanupConfig,
}

/// Lease/backoff tuning for the table-backed mutex.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MutexConfig {
    /// How long an acquired lock stays valid if its holder never releases it (ms)
    pub lease_ms: u64,
    /// First retry delay after a failed acquisition (ms)
    pub retry_base_ms: u64,
    /// Ceiling for the doubling retry delay (ms)
    pub retry_max_ms: u64,
    /// Fraction of each delay randomised to spread competing holders apart.
    pub jitter_ratio: f32,
    /// Give up and report a timeout after waiting this long (ms)
    pub acquire_timeout_ms: u64,
}

impl MutexConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let scaled = self.retry_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(scaled.min(self.retry_max_ms))
    }
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            lease_ms: 60_000,
            retry_base_ms: 50,
            retry_max_ms: 1_000,
            jitter_ratio: 0.25,
            acquire_timeout_ms: 30_000,
        }
    }
}

/// Retention sweep tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Terminal jobs older than this many days are deleted. Zero or negative
    /// disables the sweep.
    pub retention_days: i64,
    /// Cadence of the sweep (seconds)
    pub interval_secs: u64,
    /// Page size used while collecting candidates.
    pub page_size: usize,
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            interval_secs: 3_600,
            page_size: 100,
        }
    }
}
