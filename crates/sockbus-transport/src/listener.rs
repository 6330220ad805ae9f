use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::address::Address;
use crate::error::{Result, TransportError};
use crate::traits::IpcStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener on either transport.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind a listener for `address`.
    pub async fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .map_err(|source| TransportError::Bind {
                        address: address.to_string(),
                        source,
                    })?;
                info!(%address, "listening on tcp");
                Ok(Self::Tcp(listener))
            }
            #[cfg(unix)]
            Address::Unix(path) => Ok(Self::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Address::Unix(path) => Err(TransportError::Unsupported(format!(
                "unix domain socket {}",
                path.display()
            ))),
        }
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<IpcStream> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                let _ = stream.set_nodelay(true);
                debug!(%peer, "accepted tcp connection");
                Ok(IpcStream::from_tcp(stream))
            }
            #[cfg(unix)]
            Listener::Unix(socket) => socket.accept().await,
        }
    }

    /// The address actually bound (resolves an ephemeral TCP port).
    pub fn local_address(&self) -> Result<Address> {
        match self {
            Listener::Tcp(listener) => {
                let addr = listener.local_addr()?;
                Ok(Address::tcp(addr.ip().to_string(), addr.port()))
            }
            #[cfg(unix)]
            Listener::Unix(socket) => Ok(Address::unix(socket.path())),
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.local_address() {
            Ok(address) => f.debug_tuple("Listener").field(&address).finish(),
            Err(_) => f.debug_tuple("Listener").field(&"<unbound>").finish(),
        }
    }
}

/// Open an outbound connection to `address`.
pub async fn connect(address: &Address) -> Result<IpcStream> {
    match address {
        Address::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|source| TransportError::Connect {
                    address: address.to_string(),
                    source,
                })?;
            let _ = stream.set_nodelay(true);
            debug!(%address, "connected over tcp");
            Ok(IpcStream::from_tcp(stream))
        }
        #[cfg(unix)]
        Address::Unix(path) => UnixDomainSocket::connect(path).await,
        #[cfg(not(unix))]
        Address::Unix(path) => Err(TransportError::Unsupported(format!(
            "unix domain socket {}",
            path.display()
        ))),
    }
}
