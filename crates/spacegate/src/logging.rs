//! Logging setup.
//!
//! Installs a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back
//! to the configured level.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, SpaceError};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// Calling this again after a successful install is a no-op. Fails if some
/// other subscriber is already the global default.
pub fn init_logging(config: LogConfig) -> Result<()> {
    if INSTALLED.load(Ordering::Acquire) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SpaceError::Logging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(config.with_target))
        .try_init()
        .map_err(|e| SpaceError::Logging(e.to_string()))?;

    INSTALLED.store(true, Ordering::Release);
    Ok(())
}
