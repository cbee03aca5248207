//! Transport layer
//!
//! Raw byte streams for the runtime. Layers never see these; the runtime
//! translates socket activity into events and commands into socket calls.

mod tcp;

pub use tcp::TcpTransport;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::Address;
use crate::error::Result;

/// Combined trait for async read + write
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Byte stream to a client or a server
pub type Stream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// A connection handed out by a [`Listener`]
pub struct Accepted {
    pub stream: Stream,
    /// Remote address of the client
    pub peer: Address,
    /// Local address the client connected to
    pub local: Address,
}

/// Establishes raw connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a remote address
    async fn connect(&self, addr: &Address) -> Result<Stream>;

    /// Create a listener bound to an address
    async fn bind(&self, addr: &Address) -> Result<Box<dyn Listener>>;
}

/// Accepts incoming connections
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> Result<Accepted>;

    /// Get the local bound address
    fn local_addr(&self) -> Result<Address>;
}
