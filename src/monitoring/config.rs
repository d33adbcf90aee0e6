//! Logging settings for the CLI
//!
//! `MONITORING_ENABLED=false` skips subscriber setup entirely. `RUST_LOG`
//! sets the filter, `LOG_FORMAT` picks text or json on stderr, and
//! `LOG_DIR` turns on daily JSON files in that directory.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// Fallback filter when `RUST_LOG` is not set.
    pub filter: String,
    pub format: LogFormat,
    /// Daily-rotated JSON logs go here when set.
    pub file_dir: Option<PathBuf>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: "memfuse=info".to_string(),
            format: LogFormat::Text,
            file_dir: None,
        }
    }
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            enabled: get("MONITORING_ENABLED")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "off"))
                .unwrap_or(defaults.enabled),
            filter: get("RUST_LOG").unwrap_or(defaults.filter),
            format: get("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            file_dir: get("LOG_DIR").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = MonitoringConfig::from_lookup(lookup(&[]));
        assert!(config.enabled);
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.file_dir.is_none());
    }

    #[test]
    fn test_log_dir_enables_file_output() {
        let config = MonitoringConfig::from_lookup(lookup(&[
            ("LOG_DIR", "/var/log/memfuse"),
            ("LOG_FORMAT", "JSON"),
            ("MONITORING_ENABLED", "off"),
        ]));
        assert_eq!(config.file_dir, Some(PathBuf::from("/var/log/memfuse")));
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.enabled);
    }

    #[test]
    fn test_unknown_format_keeps_text() {
        let config = MonitoringConfig::from_lookup(lookup(&[("LOG_FORMAT", "yaml")]));
        assert_eq!(config.format, LogFormat::Text);
    }
}
