//! Daemon configuration (environment variables with defaults)

use sendflow_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use sendflow_api_rpc::RpcServerConfig;
use sendflow_core::application::DispatchSettings;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.sendflow/sendflow.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc: RpcServerConfig,
    /// Unset means the dry-run gateway
    pub gateway_url: Option<String>,
    pub dispatch: DispatchSettings,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    /// Read `SENDFLOW_*` variables once at startup
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = DispatchSettings::default();

        let db_path = lookup("SENDFLOW_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let rpc = RpcServerConfig {
            host: lookup("SENDFLOW_RPC_HOST")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            port: lookup("SENDFLOW_RPC_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RPC_PORT),
        };

        let dispatch = DispatchSettings {
            tick: parsed("SENDFLOW_TICK_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick),
            poll_every_ticks: lookup("SENDFLOW_POLL_EVERY_TICKS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.poll_every_ticks),
            paused_poll_interval: parsed("SENDFLOW_PAUSED_POLL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.paused_poll_interval),
        };

        let log_format = match lookup("SENDFLOW_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            db_path: PathBuf::from(shellexpand::tilde(&db_path).into_owned()),
            rpc,
            gateway_url: lookup("SENDFLOW_GATEWAY_URL").filter(|s| !s.trim().is_empty()),
            dispatch,
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> DaemonConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert!(config.db_path.ends_with(".sendflow/sendflow.db"));
        assert!(!config.db_path.to_string_lossy().starts_with('~'));
        assert_eq!(config.rpc.host, "127.0.0.1");
        assert_eq!(config.rpc.port, 9630);
        assert!(config.gateway_url.is_none());
        assert_eq!(config.dispatch.tick, Duration::from_secs(1));
        assert_eq!(config.dispatch.poll_every_ticks, 5);
        assert_eq!(config.dispatch.paused_poll_interval, Duration::from_secs(2));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SENDFLOW_DB_PATH", "/tmp/sf/jobs.db"),
            ("SENDFLOW_RPC_PORT", "9700"),
            ("SENDFLOW_GATEWAY_URL", "http://127.0.0.1:8088"),
            ("SENDFLOW_TICK_MS", "250"),
            ("SENDFLOW_POLL_EVERY_TICKS", "2"),
            ("SENDFLOW_PAUSED_POLL_MS", "500"),
            ("SENDFLOW_LOG_FORMAT", "json"),
        ]);
        assert_eq!(config.db_path, PathBuf::from("/tmp/sf/jobs.db"));
        assert_eq!(config.rpc.port, 9700);
        assert_eq!(config.gateway_url.as_deref(), Some("http://127.0.0.1:8088"));
        assert_eq!(config.dispatch.tick, Duration::from_millis(250));
        assert_eq!(config.dispatch.poll_every_ticks, 2);
        assert_eq!(config.dispatch.paused_poll_interval, Duration::from_millis(500));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("SENDFLOW_RPC_PORT", "not-a-port"),
            ("SENDFLOW_TICK_MS", "0"),
            ("SENDFLOW_POLL_EVERY_TICKS", "-1"),
            ("SENDFLOW_GATEWAY_URL", "  "),
        ]);
        assert_eq!(config.rpc.port, 9630);
        assert_eq!(config.dispatch.tick, Duration::from_secs(1));
        assert_eq!(config.dispatch.poll_every_ticks, 5);
        assert!(config.gateway_url.is_none());
    }
}
