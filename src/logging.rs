//! Logging configuration with journald support on Linux.
//!
//! Sync runs are usually started from a timer unit, so on Linux the journal is
//! preferred and entries carry the `trailstamp` syslog identifier. Elsewhere,
//! when `[logging] journald = false`, or when the journal is unreachable, logs
//! go to a daily rolling file in the configured log directory.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable that overrides `[logging] level`.
pub const LOG_ENV: &str = "TRAILSTAMP_LOG";

/// Initialize the logging system. Call once, after the config is loaded.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = filter(config, std::env::var(LOG_ENV).ok().as_deref());

    #[cfg(target_os = "linux")]
    {
        if config.journald {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(journald_layer.with_syslog_identifier("trailstamp".to_string()))
                    .init();

                tracing::info!("Logging initialized with journald backend");
                return Ok(());
            }
        }
    }

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "trailstamp.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer thread stops when the guard drops; init() runs once per process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

/// The env override if it parses, else the configured level, else `info`.
fn filter(config: &LoggingConfig, env: Option<&str>) -> EnvFilter {
    env.and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_new(&config.level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
