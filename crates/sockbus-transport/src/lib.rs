//! Stream transport for sockbus.
//!
//! Provides a unified async interface over the two supported transports:
//! - TCP (`host:port`)
//! - Unix domain sockets (filesystem path, Unix only)
//!
//! This is the lowest layer of sockbus. Everything else builds on top of
//! the [`IpcStream`] and [`Listener`] types provided here.

pub mod address;
pub mod error;
pub mod listener;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use address::{Address, DEFAULT_HOST, DEFAULT_SOCKET_PATH};
pub use error::{Result, TransportError};
pub use listener::{connect, Listener};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
