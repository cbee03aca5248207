//! Test fixtures shared by the unit tests

use std::sync::{Arc, Mutex};

use crate::common::{Connection, Connections, TransportProtocol};
use crate::config::Options;
use crate::error::Result;
use crate::layers::{LayerFactory, PassthroughFactory};
use crate::proxy::{Context, Layer, LayerKind, Protocol, ProxyMode, Services};

/// A client connection with its context, ready to receive layers
pub struct TestContext {
    pub conns: Connections,
    pub cx: Context,
    recorder: Arc<RecordingFactory>,
}

impl TestContext {
    /// Transparent TCP connection to 192.0.2.10:443, no layers yet
    pub fn tcp() -> Self {
        Self::bare(ProxyMode::Transparent, TransportProtocol::Tcp)
    }

    /// Transparent UDP connection to 192.0.2.10:443, no layers yet
    pub fn udp() -> Self {
        Self::bare(ProxyMode::Transparent, TransportProtocol::Udp)
    }

    /// Context whose stack already holds the root layer of `mode`
    pub fn with_mode(mode: ProxyMode, transport: TransportProtocol) -> Self {
        let kind = LayerKind::for_mode(&mode);
        let mut t = Self::bare(mode, transport);
        t.cx.push_layer(kind);
        t
    }

    /// Context with an empty stack. Layer builds are recorded, see
    /// [`TestContext::recorder`].
    pub fn bare(mode: ProxyMode, transport: TransportProtocol) -> Self {
        let recorder = Arc::new(RecordingFactory::default());
        let services = Services::default().with_layers(recorder.clone());
        let mut conns = Connections::new();
        let client = conns.insert(
            Connection::client(
                "10.0.0.1:50000".parse().unwrap(),
                "10.0.0.2:8080".parse().unwrap(),
                transport,
            )
            .with_original_destination("192.0.2.10:443".parse().unwrap()),
        );
        let cx = Context::new(
            client,
            mode,
            Arc::new(Options::default()),
            Arc::new(services),
            &mut conns,
        );
        Self { conns, cx, recorder }
    }

    pub fn options_mut(&mut self) -> &mut Options {
        Arc::make_mut(&mut self.cx.options)
    }

    pub fn recorder(&self) -> &RecordingFactory {
        &self.recorder
    }
}

/// Builds layers like [`PassthroughFactory`] and remembers the stack each
/// layer was built on
#[derive(Debug, Default)]
pub struct RecordingFactory {
    built: Mutex<Vec<Vec<LayerKind>>>,
}

impl RecordingFactory {
    /// Layer kinds of the context of each build, in build order
    pub fn built(&self) -> Vec<Vec<LayerKind>> {
        self.built.lock().unwrap().clone()
    }
}

impl LayerFactory for RecordingFactory {
    fn build(
        &self,
        kind: LayerKind,
        cx: &Context,
        child: Option<Layer>,
        conns: &mut Connections,
    ) -> Result<Box<dyn Protocol>> {
        self.built
            .lock()
            .unwrap()
            .push(cx.layers().iter().map(|h| h.kind).collect());
        PassthroughFactory.build(kind, cx, child, conns)
    }
}
