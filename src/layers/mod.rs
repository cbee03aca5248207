//! Built-in layers
//!
//! Only the layers that need nothing but connection plumbing live here: the
//! TCP/UDP relays, the proxy mode roots and the QUIC stream demultiplexer.
//! TLS, QUIC, HTTP and DNS codecs are provided through a [`LayerFactory`].

pub mod modes;
pub mod quic;
pub mod tcp;
pub mod udp;

pub use modes::mode_layer;
pub use quic::{QuicStreamLayer, RawQuicLayer};
pub use tcp::TcpLayer;
pub use udp::UdpLayer;

use tracing::warn;

use crate::common::{Connections, TransportProtocol};
use crate::error::{Error, Result};
use crate::proxy::{Command, Context, Event, Layer, LayerHandle, LayerKind, Protocol};

/// Builds the layers whose protocol logic lives outside this crate
pub trait LayerFactory: Send + Sync {
    /// Instantiate `kind` for `cx`. `child` is the next layer of the stack,
    /// already built, or `None` for the innermost layer.
    fn build(
        &self,
        kind: LayerKind,
        cx: &Context,
        child: Option<Layer>,
        conns: &mut Connections,
    ) -> Result<Box<dyn Protocol>>;
}

/// Instantiate the layer `handle` names. `cx` already lists `handle`.
pub fn build_layer(
    handle: LayerHandle,
    cx: &Context,
    child: Option<Layer>,
    conns: &mut Connections,
) -> Result<Layer> {
    let protocol: Box<dyn Protocol> = match handle.kind {
        LayerKind::Tcp { ignore } => {
            leaf(handle.kind, &child)?;
            Box::new(TcpLayer::new(cx, ignore))
        }
        LayerKind::Udp { ignore } => {
            leaf(handle.kind, &child)?;
            Box::new(UdpLayer::new(cx, ignore))
        }
        LayerKind::RawQuic { force_raw } => {
            leaf(handle.kind, &child)?;
            Box::new(RawQuicLayer::new(cx, force_raw))
        }
        kind if kind.is_mode() => {
            return Err(Error::Protocol(format!(
                "{:?} is a root layer and cannot be stacked",
                kind
            )))
        }
        LayerKind::QuicStream | LayerKind::NextLayer => {
            return Err(Error::Protocol(format!(
                "{:?} cannot be part of a layer stack",
                handle.kind
            )))
        }
        kind => cx.services.layers.build(kind, cx, child, conns)?,
    };
    Ok(Layer::from_boxed(cx, handle, protocol))
}

fn leaf(kind: LayerKind, child: &Option<Layer>) -> Result<()> {
    match child {
        Some(child) => Err(Error::Protocol(format!(
            "{:?} cannot have a child layer ({:?})",
            kind,
            child.kind()
        ))),
        None => Ok(()),
    }
}

/// Default factory used when no protocol codecs are plugged in.
///
/// Layers with a child become transparent wrappers; an innermost layer is
/// replaced by a raw relay on the client's transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFactory;

impl LayerFactory for PassthroughFactory {
    fn build(
        &self,
        kind: LayerKind,
        cx: &Context,
        child: Option<Layer>,
        conns: &mut Connections,
    ) -> Result<Box<dyn Protocol>> {
        if let Some(child) = child {
            return Ok(Box::new(Passthrough { child }));
        }
        warn!("[layers] No {:?} implementation available, relaying raw bytes", kind);
        Ok(match conns[cx.client].transport {
            TransportProtocol::Tcp => Box::new(TcpLayer::new(cx, false)),
            TransportProtocol::Udp => Box::new(UdpLayer::new(cx, false)),
        })
    }
}

/// Forwards every event to its child unchanged
struct Passthrough {
    child: Layer,
}

impl Protocol for Passthrough {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        self.child.handle_event(conns, event)
    }

    fn child(&self) -> Option<&Layer> {
        Some(&self.child)
    }
}
