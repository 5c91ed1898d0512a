//! Synchronizer configuration loaded from environment variables.
//!
//! Every setting has a default, so a coordinator can be spawned with zero
//! configuration.

use std::time::Duration;

/// Synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between scheduled sync cycles.
    /// Env: `TENDER_POLL_INTERVAL_SECS`
    /// Default: 15 seconds.
    pub poll_interval: Duration,

    /// Maximum concurrent per-record fetches within one cycle.
    /// Env: `TENDER_FETCH_CONCURRENCY`
    /// Default: `8`
    pub fetch_concurrency: usize,

    /// Pending actions older than this fail with `Timeout`.
    /// Env: `TENDER_ACTION_TIMEOUT_SECS`
    /// Default: 120 seconds.
    pub action_timeout: Duration,

    /// How long a settled action stays in the overlay.
    /// Env: `TENDER_CONFIRM_GRACE_SECS`
    /// Default: 10 seconds.
    pub confirm_grace: Duration,

    /// First retry delay after a failed count fetch.
    /// Env: `TENDER_BACKOFF_BASE_MS`
    /// Default: 1000 ms.
    pub backoff_base: Duration,

    /// Upper bound on the retry delay.
    /// Env: `TENDER_BACKOFF_CAP_MS`
    /// Default: 30000 ms.
    pub backoff_cap: Duration,

    /// How often a submitted transaction's receipt is polled.
    /// Env: `TENDER_RECEIPT_POLL_MS`
    /// Default: 2000 ms.
    pub receipt_poll: Duration,

    /// Period of the overlay timeout / eviction sweep.
    /// Env: `TENDER_HOUSEKEEPING_MS`
    /// Default: 1000 ms.
    pub housekeeping: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            fetch_concurrency: 8,
            action_timeout: Duration::from_secs(120),
            confirm_grace: Duration::from_secs(10),
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(30_000),
            receipt_poll: Duration::from_millis(2_000),
            housekeeping: Duration::from_millis(1_000),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_positive("TENDER_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(n);
        }

        if let Some(n) = parse_positive("TENDER_FETCH_CONCURRENCY") {
            config.fetch_concurrency = n as usize;
        }

        if let Some(n) = parse_positive("TENDER_ACTION_TIMEOUT_SECS") {
            config.action_timeout = Duration::from_secs(n);
        }

        if let Some(n) = parse_positive("TENDER_CONFIRM_GRACE_SECS") {
            config.confirm_grace = Duration::from_secs(n);
        }

        if let Some(n) = parse_positive("TENDER_BACKOFF_BASE_MS") {
            config.backoff_base = Duration::from_millis(n);
        }

        if let Some(n) = parse_positive("TENDER_BACKOFF_CAP_MS") {
            config.backoff_cap = Duration::from_millis(n);
        }

        if config.backoff_cap < config.backoff_base {
            tracing::warn!(
                base_ms = config.backoff_base.as_millis() as u64,
                cap_ms = config.backoff_cap.as_millis() as u64,
                "Backoff cap below base, raising cap to base"
            );
            config.backoff_cap = config.backoff_base;
        }

        if let Some(n) = parse_positive("TENDER_RECEIPT_POLL_MS") {
            config.receipt_poll = Duration::from_millis(n);
        }

        if let Some(n) = parse_positive("TENDER_HOUSEKEEPING_MS") {
            config.housekeeping = Duration::from_millis(n);
        }

        config
    }
}

fn parse_positive(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var, value = %raw, "Invalid value, using default");
            None
        }
    }
}
