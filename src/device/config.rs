//! Device client configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LockstreamError, Result};
use crate::session::SessionConfig;
use crate::transport::TransportKind;

/// Default delay before logging in again after a failure (3 seconds).
pub const DEFAULT_RELOGIN_DELAY_MS: u64 = 3_000;

/// Default login request timeout (10 seconds).
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 10_000;

/// Settings for [`DeviceClient`](super::DeviceClient).
///
/// Every field has a default, so a config file only needs `host`:
///
/// ```
/// use lockstream_client::device::DeviceConfig;
///
/// let config = DeviceConfig::from_json(r#"{"host": "lock.example:8080"}"#).unwrap();
/// assert_eq!(config.login_url(), "http://lock.example:8080/login");
/// assert_eq!(config.realtime_url(), "ws://lock.example:8080/realtime");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Backend `host[:port]`.
    pub host: String,
    /// Login endpoint path. Default: `/login`
    pub login_path: String,
    /// Realtime stream path (WebSocket only). Default: `/realtime`
    pub realtime_path: String,
    /// Default: websocket
    pub transport: TransportKind,
    /// Fixed delay between relogin attempts. Default: 3000
    pub relogin_delay_ms: u64,
    /// Default: 10000
    pub login_timeout_ms: u64,
    /// Default: `/message/queue/online`
    pub online_topic: String,
    /// Default: `/message/queue/sensor_data`
    pub sensor_topic: String,
    /// Default: `/message/response`
    pub response_topic: String,
    /// Where commands are sent. Default: `/request/cmd`
    pub command_destination: String,
    pub session: SessionConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            login_path: "/login".to_string(),
            realtime_path: "/realtime".to_string(),
            transport: TransportKind::default(),
            relogin_delay_ms: DEFAULT_RELOGIN_DELAY_MS,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            online_topic: "/message/queue/online".to_string(),
            sensor_topic: "/message/queue/sensor_data".to_string(),
            response_topic: "/message/response".to_string(),
            command_destination: "/request/cmd".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Defaults for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }

    pub fn relogin_delay(mut self, delay: Duration) -> Self {
        self.relogin_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn relogin_interval(&self) -> Duration {
        Duration::from_millis(self.relogin_delay_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn login_url(&self) -> String {
        format!("http://{}{}", self.host, self.login_path)
    }

    /// Transport address for the realtime stream.
    pub fn realtime_url(&self) -> String {
        self.transport.address(&self.host, &self.realtime_path)
    }

    /// Reject configs that cannot produce a working client.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LockstreamError::Config("host is empty".to_string()));
        }
        for (name, path) in [
            ("login_path", &self.login_path),
            ("realtime_path", &self.realtime_path),
        ] {
            if !path.starts_with('/') {
                return Err(LockstreamError::Config(format!(
                    "{} must start with '/': {:?}",
                    name, path
                )));
            }
        }
        if self.command_destination.is_empty() {
            return Err(LockstreamError::Config(
                "command_destination is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::new("h:1");
        assert_eq!(config.relogin_interval(), Duration::from_millis(3000));
        assert_eq!(config.command_destination, "/request/cmd");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_overrides() {
        let config = DeviceConfig::from_json(
            r#"{
                "host": "10.0.0.2:61613",
                "transport": "tcp",
                "relogin_delay_ms": 500,
                "session": {"heartbeat_outgoing_ms": 0}
            }"#,
        )
        .unwrap();
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.realtime_url(), "10.0.0.2:61613");
        assert_eq!(config.relogin_interval(), Duration::from_millis(500));
        assert_eq!(config.session.heartbeat_outgoing_ms, 0);
        assert_eq!(config.session.heartbeat_incoming_ms, 10_000);
        assert_eq!(config.online_topic, "/message/queue/online");
    }

    #[test]
    fn test_validate() {
        assert!(DeviceConfig::default().validate().is_err());

        let mut config = DeviceConfig::new("h");
        config.login_path = "login".to_string();
        assert!(matches!(config.validate(), Err(LockstreamError::Config(_))));
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(matches!(
            DeviceConfig::from_json("{host: nope"),
            Err(LockstreamError::Json(_))
        ));
    }
}
