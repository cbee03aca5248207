//! Proxy mode layers
//!
//! Every physical connection starts with exactly one of these at the root of
//! its stack. They establish where the server connection points to and hand
//! everything else to a `NextLayer` marker.

use tracing::Level;

use crate::common::{ConnectionId, Connections, TransportProtocol};
use crate::config::ConnectionStrategy;
use crate::error::{Error, Result};
use crate::proxy::{
    Command, CommandId, Context, Event, Layer, LayerKind, NextLayer, Protocol, ProxyMode, Reply,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Opening(CommandId),
    Forward,
    Done,
}

/// Root layer for one of the proxy modes
pub struct ModeLayer {
    kind: LayerKind,
    mode: ProxyMode,
    client: ConnectionId,
    server: ConnectionId,
    eager: bool,
    keep_host_header: bool,
    state: State,
    child: Layer,
}

/// Build the root layer for `cx.mode`. `cx` must not list any layer yet.
pub fn mode_layer(cx: &Context) -> Result<Layer> {
    if !cx.layers().is_empty() {
        return Err(Error::Protocol(format!(
            "mode layer must be the root of the stack, found {:?}",
            cx.layers()
        )));
    }
    let kind = LayerKind::for_mode(&cx.mode);

    let mut cx = cx.fork();
    let handle = cx.push_layer(kind);
    let mode = ModeLayer {
        kind,
        mode: cx.mode.clone(),
        client: cx.client,
        server: cx.server,
        eager: cx.options.connection_strategy == ConnectionStrategy::Eager,
        keep_host_header: cx.options.keep_host_header,
        state: State::Start,
        child: NextLayer::layer(&cx, false),
    };
    Ok(Layer::new(&cx, handle, mode))
}

impl ModeLayer {
    /// Point the server connection at its destination
    fn resolve_destination(&self, conns: &mut Connections) -> Result<()> {
        match &self.mode {
            ProxyMode::Reverse { scheme, address } => {
                let server = &mut conns[self.server];
                server.address = Some(address.clone());
                if scheme.is_secure() && !self.keep_host_header {
                    server.sni = Some(address.host());
                }
            }
            ProxyMode::Transparent => {
                let destination = conns[self.client].original_destination.clone().ok_or_else(|| {
                    Error::Protocol(format!(
                        "{} has no original destination, cannot proxy transparently",
                        self.client
                    ))
                })?;
                conns[self.server].address = Some(destination);
            }
            ProxyMode::Regular | ProxyMode::Upstream { .. } => {}
        }
        Ok(())
    }

    fn start(&mut self, conns: &mut Connections) -> Result<Vec<Command>> {
        if matches!(self.kind, LayerKind::HttpProxy | LayerKind::HttpUpstreamProxy) {
            self.state = State::Forward;
            return self.child.handle_event(conns, Event::Start);
        }

        self.resolve_destination(conns)?;
        let server = &conns[self.server];
        if self.eager && server.transport == TransportProtocol::Tcp && server.timestamp_start.is_none() {
            let open = Command::open_connection(self.server);
            self.state = State::Opening(open.id);
            return Ok(vec![open]);
        }
        self.state = State::Forward;
        self.child.handle_event(conns, Event::Start)
    }
}

impl Protocol for ModeLayer {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        match (self.state, event) {
            (State::Start, Event::Start) => self.start(conns),
            (State::Opening(id), Event::CommandCompleted(done)) if done.command.id == id => {
                if let Reply::OpenConnection(Some(err)) = done.reply {
                    self.state = State::Done;
                    return Ok(vec![
                        Command::log(Level::INFO, format!("Unable to establish server connection: {}", err)),
                        Command::close_connection(self.client),
                    ]);
                }
                self.state = State::Forward;
                self.child.handle_event(conns, Event::Start)
            }
            (State::Forward, event) => self.child.handle_event(conns, event),
            (State::Done, _) => Ok(Vec::new()),
            (state, event) => Err(Error::Protocol(format!(
                "[{:?}] unexpected event {:?} in state {:?}",
                self.kind, event, state
            ))),
        }
    }

    fn child(&self) -> Option<&Layer> {
        Some(&self.child)
    }
}
