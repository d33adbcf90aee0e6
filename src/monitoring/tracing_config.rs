//! Structured logging with tracing
//!
//! Sets up:
//! - Console logging, text or JSON
//! - Optional file logging with daily rotation (always JSON)
//! - Log levels from RUST_LOG

use super::config::{LogFormat, MonitoringConfig};
use tracing_appender::non_blocking;
use tracing_appender::rolling::daily;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "memfuse.log";

/// Initialize the tracing subscriber.
///
/// Returns a guard that must be kept alive for the duration of the program.
/// Dropping the guard stops file logging.
pub fn init_tracing(config: &MonitoringConfig) -> Result<Box<dyn std::any::Any>, Box<dyn std::error::Error>> {
    if !config.enabled {
        return Ok(Box::new(()));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let console_layer = {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        match config.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Text => layer.boxed(),
        }
    };

    let mut guard: Box<dyn std::any::Any> = Box::new(());
    let file_layer = if let Some(dir) = &config.file_dir {
        std::fs::create_dir_all(dir)?;
        let file_appender = daily(dir, LOG_FILE_PREFIX);
        let (non_blocking_file, file_guard) = non_blocking(file_appender);
        guard = Box::new(file_guard);
        Some(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false) // No ANSI codes in files
                .json(),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_initialization() {
        let config = MonitoringConfig::default();
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_tracing_disabled() {
        let config = MonitoringConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_file_logging_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitoringConfig {
            file_dir: Some(dir.path().join("logs")),
            ..Default::default()
        };
        assert!(init_tracing(&config).is_ok());
        assert!(dir.path().join("logs").exists());
    }
}
