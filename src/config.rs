use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND_PORT: u16 = 25585;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub tick_interval: Duration,
    /// `None` disables the status heartbeat.
    pub status_heartbeat: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MGMT_API_TOKEN is required and must not be empty")]
    MissingApiToken,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error("MGMT_TICK_INTERVAL_MS must be a positive integer")]
    InvalidTickInterval,
    #[error("MGMT_STATUS_HEARTBEAT_SECS must be a non-negative integer")]
    InvalidHeartbeat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env::var("MGMT_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingApiToken)?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let tick_interval_ms = env::var("MGMT_TICK_INTERVAL_MS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .ok_or(ConfigError::InvalidTickInterval)
            })
            .transpose()?
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        let heartbeat_secs = env::var("MGMT_STATUS_HEARTBEAT_SECS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidHeartbeat)
            })
            .transpose()?
            .unwrap_or(0);

        let config = Self {
            api_token,
            bind_addr,
            bind_port,
            tick_interval: Duration::from_millis(tick_interval_ms),
            status_heartbeat: (heartbeat_secs > 0).then(|| Duration::from_secs(heartbeat_secs)),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // The environment is process-wide; tests that touch it take turns.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "MGMT_API_TOKEN",
        "BIND_ADDR",
        "BIND_PORT",
        "MGMT_TICK_INTERVAL_MS",
        "MGMT_STATUS_HEARTBEAT_SECS",
    ];

    fn with_env<T>(vars: &[(&str, &str)], test: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for name in VARS {
            env::remove_var(name);
        }
        for (name, value) in vars {
            env::set_var(name, value);
        }
        test()
    }

    #[test]
    fn parse_defaults() {
        let config = with_env(&[("MGMT_API_TOKEN", "abc")], Config::from_env)
            .expect("config should parse");

        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, DEFAULT_BIND_PORT);
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.status_heartbeat, None);
    }

    #[test]
    fn missing_token_fails() {
        let err = with_env(&[("MGMT_API_TOKEN", "   ")], Config::from_env)
            .expect_err("expected missing token error");
        assert!(matches!(err, ConfigError::MissingApiToken));
    }

    #[test]
    fn heartbeat_and_tick_parse_when_valid() {
        let config = with_env(
            &[
                ("MGMT_API_TOKEN", "abc"),
                ("MGMT_TICK_INTERVAL_MS", "20"),
                ("MGMT_STATUS_HEARTBEAT_SECS", "30"),
            ],
            Config::from_env,
        )
        .expect("config should parse");

        assert_eq!(config.tick_interval, Duration::from_millis(20));
        assert_eq!(config.status_heartbeat, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_tick_interval_fails() {
        let err = with_env(
            &[("MGMT_API_TOKEN", "abc"), ("MGMT_TICK_INTERVAL_MS", "0")],
            Config::from_env,
        )
        .expect_err("expected invalid tick interval");
        assert!(matches!(err, ConfigError::InvalidTickInterval));
    }

    #[test]
    fn invalid_bind_address_fails() {
        let err = with_env(
            &[("MGMT_API_TOKEN", "abc"), ("BIND_ADDR", "not an address")],
            Config::from_env,
        )
        .expect_err("expected invalid socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
