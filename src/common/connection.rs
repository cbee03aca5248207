//! Connection model shared by every layer
//!
//! Layers never own sockets. They refer to connections through a
//! [`ConnectionId`] handed out by the per-physical-connection
//! [`Connections`] arena, so a connection keeps its identity while its
//! fields (state, address, TLS details) change underneath.

use std::fmt;
use std::ops::{BitAnd, BitOr, Index, IndexMut, Not};
use std::time::SystemTime;

use super::Address;

/// Stable identity of a connection inside one [`Connections`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Transport protocol of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Tcp => write!(f, "tcp"),
            TransportProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// Read/write capability bits of a connection
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionState(u8);

impl ConnectionState {
    pub const CLOSED: Self = Self(0);
    pub const CAN_READ: Self = Self(1);
    pub const CAN_WRITE: Self = Self(2);
    pub const OPEN: Self = Self(3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn can_read(self) -> bool {
        self.contains(Self::CAN_READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Self::CAN_WRITE)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for ConnectionState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ConnectionState {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ConnectionState {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::OPEN.0)
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::CLOSED => "CLOSED",
            Self::CAN_READ => "CAN_READ",
            Self::CAN_WRITE => "CAN_WRITE",
            _ => "OPEN",
        };
        f.write_str(name)
    }
}

/// Which endpoint opened a QUIC stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuicInitiator {
    Client,
    Server,
}

/// Stream metadata carried by the virtual connections of a QUIC stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicStreamInfo {
    pub client_stream_id: u64,
    pub server_stream_id: Option<u64>,
    pub initiator: QuicInitiator,
    pub unidirectional: bool,
}

/// A client or server connection, physical or virtual
#[derive(Debug, Clone, Default)]
pub struct Connection {
    /// Remote address of the peer
    pub peername: Option<Address>,
    /// Local address of our socket
    pub sockname: Option<Address>,
    /// Destination to connect to (server connections)
    pub address: Option<Address>,
    /// Destination the client originally targeted (transparent mode)
    pub original_destination: Option<Address>,
    pub transport: TransportProtocol,
    pub state: ConnectionState,
    /// TLS has been established on this connection
    pub tls: bool,
    pub sni: Option<String>,
    pub alpn: Option<Vec<u8>>,
    pub tls_version: Option<String>,
    pub error: Option<String>,
    pub timestamp_start: Option<SystemTime>,
    pub timestamp_end: Option<SystemTime>,
    pub quic_stream: Option<QuicStreamInfo>,
}

impl Connection {
    /// An accepted client connection, open in both directions
    pub fn client(peername: Address, sockname: Address, transport: TransportProtocol) -> Self {
        Self {
            peername: Some(peername),
            sockname: Some(sockname),
            transport,
            state: ConnectionState::OPEN,
            timestamp_start: Some(SystemTime::now()),
            ..Default::default()
        }
    }

    /// A not yet opened server connection
    pub fn server(address: Option<Address>, transport: TransportProtocol) -> Self {
        Self {
            address,
            transport,
            ..Default::default()
        }
    }

    /// Builder: set the original destination
    pub fn with_original_destination(mut self, addr: Address) -> Self {
        self.original_destination = Some(addr);
        self
    }

    /// Builder: set ClientHello details seen by an outer TLS layer
    pub fn with_tls(mut self, sni: Option<String>, alpn: Option<Vec<u8>>, version: impl Into<String>) -> Self {
        self.tls = true;
        self.sni = sni;
        self.alpn = alpn;
        self.tls_version = Some(version.into());
        self
    }

    /// Open in both directions
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::OPEN
    }
}

/// Arena of every connection belonging to one physical client connection
///
/// Connections are never removed, so a [`ConnectionId`] stays valid for the
/// lifetime of the arena.
#[derive(Debug, Default)]
pub struct Connections {
    slots: Vec<Connection>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conn: Connection) -> ConnectionId {
        self.slots.push(conn);
        ConnectionId(self.slots.len() - 1)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.slots.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.slots.iter().enumerate().map(|(i, c)| (ConnectionId(i), c))
    }
}

impl Index<ConnectionId> for Connections {
    type Output = Connection;

    fn index(&self, id: ConnectionId) -> &Connection {
        &self.slots[id.0]
    }
}

impl IndexMut<ConnectionId> for Connections {
    fn index_mut(&mut self, id: ConnectionId) -> &mut Connection {
        &mut self.slots[id.0]
    }
}
