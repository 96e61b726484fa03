use std::path::PathBuf;
use std::time::Duration;

use crate::codec::Framing;
use crate::transport::{ResponseOrder, ServeOptions};

/// File name of the event log inside the home directory.
pub const DEFAULT_LOG_FILE: &str = "mcpstdio.log";

/// Runtime configuration for one server process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit event log location; see [`Config::log_path`].
    pub log_file: Option<PathBuf>,
    pub framing: Framing,
    pub response_order: ResponseOrder,
    pub liveness_interval: Duration,
    pub request_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
    pub server_name: String,
    pub server_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: None,
            framing: Framing::default(),
            response_order: ResponseOrder::default(),
            liveness_interval: Duration::from_secs(30),
            request_timeout: None,
            shutdown_grace: Duration::from_secs(5),
            server_name: env!("CARGO_PKG_NAME").into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl Config {
    /// Where the event log goes: the explicit path if one was given, else
    /// `mcpstdio.log` in the home directory (temp dir when there is none).
    pub fn log_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(DEFAULT_LOG_FILE),
        }
    }

    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            order: self.response_order,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.framing, Framing::Lines);
        assert_eq!(config.response_order, ResponseOrder::Completion);
        assert_eq!(config.liveness_interval, Duration::from_secs(30));
        assert!(config.request_timeout.is_none());
        assert_eq!(config.server_name, "mcpstdio");
    }

    #[test]
    fn test_explicit_log_path_wins() {
        let config = Config {
            log_file: Some(PathBuf::from("/var/tmp/custom.log")),
            ..Config::default()
        };
        assert_eq!(config.log_path(), PathBuf::from("/var/tmp/custom.log"));
    }

    #[test]
    fn test_default_log_path_file_name() {
        let path = Config::default().log_path();
        assert_eq!(path.file_name().unwrap(), DEFAULT_LOG_FILE);
        assert!(path.is_absolute());
    }

    #[test]
    fn test_serve_options() {
        let config = Config {
            response_order: ResponseOrder::Arrival,
            shutdown_grace: Duration::from_millis(250),
            ..Config::default()
        };
        let options = config.serve_options();
        assert_eq!(options.order, ResponseOrder::Arrival);
        assert_eq!(options.shutdown_grace, Duration::from_millis(250));
    }
}
