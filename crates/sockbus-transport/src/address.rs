use std::fmt;
use std::path::{Path, PathBuf};

/// Default Unix domain socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/ipc.sock";

/// Host used for TCP when a port is configured without a host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where a listener binds or a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// TCP socket on `host:port`.
    Tcp { host: String, port: u16 },
    /// Unix domain socket at a filesystem path.
    Unix(PathBuf),
}

impl Address {
    /// TCP address.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix domain socket address.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(path.as_ref().to_path_buf())
    }

    /// Pick a transport from loosely specified options.
    ///
    /// A configured port always selects TCP and the path is ignored.
    /// Otherwise the path (or [`DEFAULT_SOCKET_PATH`]) selects a Unix socket.
    pub fn resolve(path: Option<&Path>, host: Option<&str>, port: Option<u16>) -> Self {
        match port {
            Some(port) => Self::tcp(host.unwrap_or(DEFAULT_HOST), port),
            None => Self::unix(path.unwrap_or_else(|| Path::new(DEFAULT_SOCKET_PATH))),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Address::Tcp { .. } => "tcp",
            Address::Unix(_) => "unix-domain-socket",
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::unix(DEFAULT_SOCKET_PATH)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Address::Tcp { host, port } => write!(f, "{host}:{port}"),
            Address::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}
