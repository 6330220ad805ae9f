use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sockbus_frame::{FrameConfig, DEFAULT_MAX_FRAME};
use sockbus_transport::{Address, DEFAULT_SOCKET_PATH};

use crate::error::{EndpointError, Result};

/// Default client connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Reconnect interval meaning "never reconnect".
pub const RECONNECT_DISABLED: i64 = -1;

/// Text encoding used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
}

/// Server options.
///
/// If `port` is set the server listens on TCP `host:port` and `path` is
/// ignored; otherwise it binds a Unix domain socket at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub encoding: Encoding,
    /// Largest accepted frame body in bytes; `None` buffers without limit.
    pub max_frame_size: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOCKET_PATH),
            host: None,
            port: None,
            encoding: Encoding::Utf8,
            max_frame_size: Some(DEFAULT_MAX_FRAME),
        }
    }
}

impl ServerConfig {
    /// Listen on a Unix domain socket.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Listen on TCP.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Override the maximum frame size.
    pub fn with_max_frame_size(mut self, max: Option<usize>) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Parse from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| EndpointError::Config(format!("server config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_common(self.port, &self.path, self.max_frame_size)
    }

    pub fn address(&self) -> Address {
        Address::resolve(Some(&self.path), self.host.as_deref(), self.port)
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }
}

/// Client options.
///
/// `timeout` bounds each connection attempt. `reconnect` is the delay
/// between reconnection attempts; zero or negative disables reconnection.
/// Reconnection has no backoff and no attempt cap: a client pointed at an
/// address that never comes up retries forever until closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub encoding: Encoding,
    pub max_frame_size: Option<usize>,
    /// Connect timeout in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Reconnect interval in milliseconds; `<= 0` disables reconnection.
    #[serde(rename = "reconnect")]
    pub reconnect_ms: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOCKET_PATH),
            host: None,
            port: None,
            encoding: Encoding::Utf8,
            max_frame_size: Some(DEFAULT_MAX_FRAME),
            timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_ms: RECONNECT_DISABLED,
        }
    }
}

impl ClientConfig {
    /// Connect to a Unix domain socket.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Connect over TCP.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Connect to wherever `address` points.
    pub fn for_address(address: &Address) -> Self {
        match address {
            Address::Tcp { host, port } => Self::tcp(host.clone(), *port),
            Address::Unix(path) => Self::unix(path),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Retry every `interval` after a failed attempt or a lost connection.
    ///
    /// Retries are unbounded and use a fixed interval; an unreachable
    /// server is dialed forever until [`crate::Endpoint::close`].
    pub fn with_reconnect(mut self, interval: Duration) -> Self {
        self.reconnect_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_ms = RECONNECT_DISABLED;
        self
    }

    pub fn with_max_frame_size(mut self, max: Option<usize>) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Parse from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| EndpointError::Config(format!("client config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(EndpointError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }
        validate_common(self.port, &self.path, self.max_frame_size)
    }

    pub fn address(&self) -> Address {
        Address::resolve(Some(&self.path), self.host.as_deref(), self.port)
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reconnect interval, or `None` when reconnection is disabled.
    pub fn reconnect_interval(&self) -> Option<Duration> {
        u64::try_from(self.reconnect_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn validate_common(port: Option<u16>, path: &Path, max_frame_size: Option<usize>) -> Result<()> {
    if port.is_none() && path.as_os_str().is_empty() {
        return Err(EndpointError::Config(
            "either a socket path or a port is required".to_string(),
        ));
    }
    if max_frame_size == Some(0) {
        return Err(EndpointError::Config(
            "max_frame_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.reconnect_interval(), None);
        assert_eq!(config.address(), Address::unix(DEFAULT_SOCKET_PATH));
        assert_eq!(config.encoding, Encoding::Utf8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reconnect_non_positive_disables() {
        for ms in [0, -1, -500] {
            let config = ClientConfig {
                reconnect_ms: ms,
                ..ClientConfig::default()
            };
            assert_eq!(config.reconnect_interval(), None, "reconnect {ms}");
        }
        let config = ClientConfig::default().with_reconnect(Duration::from_millis(250));
        assert_eq!(
            config.reconnect_interval(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.without_reconnect().reconnect_interval(), None);
    }

    #[test]
    fn port_wins_over_path() {
        let config = ServerConfig {
            port: Some(9000),
            ..ServerConfig::unix("/tmp/ignored.sock")
        };
        assert_eq!(config.address(), Address::tcp("127.0.0.1", 9000));
    }

    #[test]
    fn client_from_json_uses_wire_option_names() {
        let config = ClientConfig::from_json(
            r#"{"path": "/tmp/a.sock", "timeout": 500, "reconnect": 250, "encoding": "utf-8"}"#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/a.sock"));
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(
            config.reconnect_interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn client_rejects_zero_timeout() {
        let err = ClientConfig::from_json(r#"{"timeout": 0}"#).unwrap_err();
        assert!(matches!(err, EndpointError::Config(_)));
    }

    #[test]
    fn rejects_unknown_encoding() {
        let err = ServerConfig::from_json(r#"{"encoding": "latin1"}"#).unwrap_err();
        assert!(matches!(err, EndpointError::Config(_)));
    }

    #[test]
    fn server_rejects_zero_frame_size() {
        let config = ServerConfig::unix("/tmp/x.sock").with_max_frame_size(Some(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn for_address_preserves_transport() {
        let tcp = Address::tcp("10.1.2.3", 7000);
        assert_eq!(ClientConfig::for_address(&tcp).address(), tcp);
        let unix = Address::unix("/tmp/u.sock");
        assert_eq!(ClientConfig::for_address(&unix).address(), unix);
    }
}
