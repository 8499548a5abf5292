//! Observability Infrastructure
//!
//! Structured logging for evaluation runs. Application code uses standard
//! `tracing` macros and never knows which output format is configured.
//!
//! # Usage
//!
//! ```ignore
//! use parapet::observability::ObservabilityConfig;
//!
//! parapet::observability::init(ObservabilityConfig::from_env())?;
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive (e.g., "info", "parapet=debug,info")
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Create configuration from environment variables.
    ///
    /// - `LOG_FORMAT`: "pretty", "json", or "compact" (default: "pretty")
    /// - `RUST_LOG`: filter directive (default: "info")
    pub fn from_env() -> Self {
        let log_format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        Self {
            log_format,
            log_filter,
        }
    }
}

/// Observability initialization errors
#[derive(Debug)]
pub enum ObservabilityError {
    /// Invalid filter directive
    Config(String),
    /// A global subscriber was already installed
    AlreadyInitialized,
}

impl std::fmt::Display for ObservabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Observability config error: {}", msg),
            Self::AlreadyInitialized => write!(f, "Tracing subscriber already initialized"),
        }
    }
}

impl std::error::Error for ObservabilityError {}

/// Initialize the tracing subscriber.
///
/// Call once at startup, before any logging occurs.
pub fn init(config: ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| ObservabilityError::Config(e.to_string()))?;

    let result = match config.log_format {
        LogFormat::Pretty => fmt().with_env_filter(filter).pretty().try_init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
        LogFormat::Compact => fmt().with_env_filter(filter).compact().try_init(),
    };

    result.map_err(|_| ObservabilityError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = ObservabilityConfig {
            log_format: LogFormat::Compact,
            log_filter: "not a[valid]filter=".to_string(),
        };
        assert!(matches!(init(config), Err(ObservabilityError::Config(_))));
    }
}
