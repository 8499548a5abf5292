//! Engine Run Configuration
//!
//! Tunables for one evaluation run. Defaults are production-safe; every knob
//! can be overridden programmatically or from the environment:
//!
//! - `PARAPET_WORKERS` - concurrent work-unit limit
//! - `PARAPET_WORK_UNIT_TIMEOUT_SECS` - per-unit wall-clock budget
//! - `PARAPET_RETRY_LIMIT` - max attempts per provider call
//! - `PARAPET_LOOKBACK_DAYS` - historical audit-trail window
//! - `PARAPET_HISTORICAL` - "true"/"false", enable historical sub-checks

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Restricts which canonical controls a run evaluates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFilter {
    /// Only evaluate controls for these services. Empty means all.
    pub services: Vec<String>,
    /// Only evaluate canonical controls citing these control ids. Empty
    /// means all.
    pub control_ids: Vec<String>,
    /// Only evaluate controls cited by this standard.
    pub standard: Option<String>,
}

impl RunFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            services: vec![service.into()],
            ..Self::default()
        }
    }

    pub fn for_standard(standard: impl Into<String>) -> Self {
        Self {
            standard: Some(standard.into()),
            ..Self::default()
        }
    }

    pub fn for_control(control_id: impl Into<String>) -> Self {
        Self {
            control_ids: vec![control_id.into()],
            ..Self::default()
        }
    }

    pub fn matches_service(&self, service: &str) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| s == service)
    }
}

/// Scheduler tunables for one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum work units in flight at once.
    pub workers: usize,

    /// Wall-clock budget per work unit. Exceeding it records ERRORED with no
    /// retry.
    pub work_unit_timeout: Duration,

    /// Maximum attempts per provider call, first attempt included.
    pub retry_limit: u32,

    /// Historical audit-trail window, in days.
    pub lookback_days: i64,

    /// Whether to run historical sub-checks at all.
    pub historical: bool,

    /// Skip the historical sub-check when the current-state check already
    /// failed for the resource.
    pub fail_fast_historical: bool,

    pub filter: RunFilter,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            work_unit_timeout: Duration::from_secs(30),
            retry_limit: 5,
            lookback_days: 30,
            historical: true,
            fail_fast_historical: false,
            filter: RunFilter::all(),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(workers) = env_parse::<usize>("PARAPET_WORKERS") {
            if workers > 0 {
                config.workers = workers;
            }
        }
        if let Some(secs) = env_parse::<u64>("PARAPET_WORK_UNIT_TIMEOUT_SECS") {
            config.work_unit_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = env_parse::<u32>("PARAPET_RETRY_LIMIT") {
            if limit > 0 {
                config.retry_limit = limit;
            }
        }
        if let Some(days) = env_parse::<i64>("PARAPET_LOOKBACK_DAYS") {
            if days > 0 {
                config.lookback_days = days;
            }
        }
        if let Ok(v) = std::env::var("PARAPET_HISTORICAL") {
            config.historical = v.eq_ignore_ascii_case("true") || v == "1";
        }

        config
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_work_unit_timeout(mut self, timeout: Duration) -> Self {
        self.work_unit_timeout = timeout;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit.max(1);
        self
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn without_historical(mut self) -> Self {
        self.historical = false;
        self
    }

    pub fn with_fail_fast_historical(mut self) -> Self {
        self.fail_fast_historical = true;
        self
    }

    pub fn with_filter(mut self, filter: RunFilter) -> Self {
        self.filter = filter;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
