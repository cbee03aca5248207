//! Common types and abstractions
//!
//! This module defines the core types used throughout the application:
//! - Address: network address representation
//! - Connection: per-connection state shared by all layers
//! - Connections: arena keyed by ConnectionId
//! - Error: unified error types

mod address;
mod connection;

pub use address::Address;
pub use connection::{
    Connection, ConnectionId, ConnectionState, Connections, QuicInitiator, QuicStreamInfo,
    TransportProtocol,
};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
