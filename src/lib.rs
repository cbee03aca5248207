//! Layerwise - a protocol-layer engine for intercepting proxies
//!
//! # Architecture
//!
//! ```text
//! sockets ──► ConnectionHandler ──Event──► mode layer ──► NextLayer ──► …
//!         ◄──                   ◄─Command─            ◄──           ◄── …
//! ```
//!
//! ## Core Principles
//!
//! - Layers are sans-I/O state machines: events in, commands out
//! - Blocking commands pause a layer until their completion arrives
//! - The router picks the next layers from the first bytes of a connection
//! - QUIC connections are split into one TCP-like stack per stream
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Address, Connection, Connections arena
//! ├── proxy/           # Command/Event vocabulary, Layer engine, stacks
//! ├── layers/          # Built-in layers: relays, mode roots, QUIC demux
//! ├── sniff/           # TLS/DTLS/QUIC/HTTP byte sniffers
//! ├── router/          # Next-layer decision procedure
//! ├── server/          # Connection handler and tokio runtime
//! └── transport/       # TCP transport used by the runtime
//! ```

// Core types
pub mod common;
pub mod error;

// Engine
pub mod layers;
pub mod proxy;
pub mod router;
pub mod sniff;

// Runtime
pub mod config;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use common::{Address, Connection, ConnectionId, Connections};
pub use config::{Config, Options};
pub use error::{Error, Result};
pub use proxy::{Command, Event, Layer, LayerKind, LayerStack, NextLayer, Protocol, ProxyMode};
pub use router::{NextLayerRouter, Router};
pub use server::{ConnectionHandler, Runtime};
