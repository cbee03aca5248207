//! Per-layer context
//!
//! A [`Context`] names the client and server connection a layer works on and
//! records which layers sit above it. Layers get their own copy; forking is a
//! plain clone of ids and handles, never an alias of another layer's list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::{Connection, ConnectionId, Connections};
use crate::config::Options;
use crate::layers::{LayerFactory, PassthroughFactory};
use crate::router::{NextLayerRouter, Router};

use super::ProxyMode;

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a layer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// HTTP layer flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMode {
    /// Explicit proxy, requests carry absolute URLs or CONNECT
    Regular,
    /// Destination already known
    Transparent,
    /// Explicit proxy forwarding to another proxy
    Upstream,
}

/// Every kind of layer a stack can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    HttpProxy,
    HttpUpstreamProxy,
    ReverseProxy,
    TransparentProxy,
    ServerTls,
    ClientTls,
    ServerQuic,
    ClientQuic,
    Http(HttpMode),
    Dns,
    Tcp { ignore: bool },
    Udp { ignore: bool },
    RawQuic { force_raw: bool },
    QuicStream,
    /// Undecided placeholder, never recorded in a context
    NextLayer,
}

impl LayerKind {
    /// Mode layers sit at the root of every stack
    pub fn is_mode(self) -> bool {
        matches!(
            self,
            LayerKind::HttpProxy
                | LayerKind::HttpUpstreamProxy
                | LayerKind::ReverseProxy
                | LayerKind::TransparentProxy
        )
    }

    /// Root layer serving `mode`
    pub fn for_mode(mode: &ProxyMode) -> Self {
        match mode {
            ProxyMode::Regular => LayerKind::HttpProxy,
            ProxyMode::Upstream { .. } => LayerKind::HttpUpstreamProxy,
            ProxyMode::Transparent => LayerKind::TransparentProxy,
            ProxyMode::Reverse { .. } => LayerKind::ReverseProxy,
        }
    }
}

/// A layer's entry in a context's stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerHandle {
    pub id: LayerId,
    pub kind: LayerKind,
}

impl LayerHandle {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            id: LayerId::next(),
            kind,
        }
    }
}

/// Pluggable collaborators shared by every connection
pub struct Services {
    /// Decides what replaces a `NextLayer` marker
    pub router: Arc<dyn Router>,
    /// Builds protocol layers implemented outside this crate
    pub layers: Arc<dyn LayerFactory>,
}

impl Services {
    pub fn new(router: Arc<dyn Router>, layers: Arc<dyn LayerFactory>) -> Self {
        Self { router, layers }
    }

    /// Builder: replace the layer factory
    pub fn with_layers(mut self, layers: Arc<dyn LayerFactory>) -> Self {
        self.layers = layers;
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(Arc::new(NextLayerRouter), Arc::new(PassthroughFactory))
    }
}

#[derive(Clone)]
pub struct Context {
    pub client: ConnectionId,
    pub server: ConnectionId,
    pub mode: ProxyMode,
    pub options: Arc<Options>,
    pub services: Arc<Services>,
    layers: Vec<LayerHandle>,
}

impl Context {
    /// Context for a fresh client connection. Registers an unopened server
    /// connection using the client's transport.
    pub fn new(
        client: ConnectionId,
        mode: ProxyMode,
        options: Arc<Options>,
        services: Arc<Services>,
        conns: &mut Connections,
    ) -> Self {
        let transport = conns[client].transport;
        let server = conns.insert(Connection::server(None, transport));
        Self {
            client,
            server,
            mode,
            options,
            services,
            layers: Vec::new(),
        }
    }

    /// Independent copy sharing the same connections
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Layers from the root down to (and including) the owner of this context
    pub fn layers(&self) -> &[LayerHandle] {
        &self.layers
    }

    /// Record a new layer at the bottom of this context's stack
    pub fn push_layer(&mut self, kind: LayerKind) -> LayerHandle {
        let handle = LayerHandle::new(kind);
        self.layers.push(handle);
        handle
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("client", &self.client)
            .field("server", &self.server)
            .field("mode", &self.mode)
            .field("layers", &self.layers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Address, TransportProtocol};

    fn context(conns: &mut Connections) -> Context {
        let client = conns.insert(Connection::client(
            "10.0.0.1:5000".parse().unwrap(),
            "10.0.0.2:8080".parse().unwrap(),
            TransportProtocol::Udp,
        ));
        Context::new(
            client,
            ProxyMode::Transparent,
            Arc::new(Options::default()),
            Arc::new(Services::default()),
            conns,
        )
    }

    #[test]
    fn test_server_inherits_client_transport() {
        let mut conns = Connections::new();
        let cx = context(&mut conns);
        assert_eq!(conns[cx.server].transport, TransportProtocol::Udp);
        assert!(conns[cx.server].address.is_none());
    }

    #[test]
    fn test_fork_does_not_alias_layers() {
        let mut conns = Connections::new();
        let mut cx = context(&mut conns);
        cx.push_layer(LayerKind::TransparentProxy);

        let mut fork = cx.fork();
        fork.push_layer(LayerKind::Udp { ignore: false });

        assert_eq!(cx.layers().len(), 1);
        assert_eq!(fork.layers().len(), 2);
        assert_eq!(fork.server, cx.server);

        conns[fork.server].address = Some(Address::domain("example.com", 443));
        assert!(conns[cx.server].address.is_some());
    }
}
