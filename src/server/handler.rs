//! Sans-I/O driver for one physical client connection
//!
//! The handler owns the connection arena and the root layer. It keeps the
//! connection records in sync with what the events and commands say
//! happened, so layers can trust `state` and the timestamps.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::debug;

use crate::common::{Connection, ConnectionId, ConnectionState, Connections};
use crate::config::Options;
use crate::error::Result;
use crate::layers::mode_layer;
use crate::layers::quic::QuicEvent;
use crate::proxy::{Command, CommandKind, Context, Event, Layer, ProxyMode, Reply, Services};

pub struct ConnectionHandler {
    conns: Connections,
    cx: Context,
    root: Layer,
}

impl ConnectionHandler {
    pub fn new(
        client: Connection,
        mode: ProxyMode,
        options: Arc<Options>,
        services: Arc<Services>,
    ) -> Result<Self> {
        let mut conns = Connections::new();
        let client = conns.insert(client);
        let cx = Context::new(client, mode, options, services, &mut conns);
        let root = mode_layer(&cx)?;
        Ok(Self { conns, cx, root })
    }

    pub fn client(&self) -> ConnectionId {
        self.cx.client
    }

    pub fn server(&self) -> ConnectionId {
        self.cx.server
    }

    pub fn connections(&self) -> &Connections {
        &self.conns
    }

    pub fn root(&self) -> &Layer {
        &self.root
    }

    pub fn start(&mut self) -> Result<Vec<Command>> {
        self.handle_event(Event::Start)
    }

    pub fn data_received(&mut self, connection: ConnectionId, data: Bytes) -> Result<Vec<Command>> {
        self.handle_event(Event::DataReceived { connection, data })
    }

    /// The peer of `connection` stopped sending
    pub fn connection_closed(&mut self, connection: ConnectionId) -> Result<Vec<Command>> {
        self.handle_event(Event::ConnectionClosed { connection })
    }

    pub fn complete(&mut self, command: Command, reply: Reply) -> Result<Vec<Command>> {
        self.handle_event(Event::completed(command, reply))
    }

    /// The client is gone and no server connection is left open
    pub fn is_finished(&self) -> bool {
        self.conns[self.cx.client].state == ConnectionState::CLOSED
            && self.conns.iter().all(|(_, conn)| {
                conn.quic_stream.is_some() || conn.state == ConnectionState::CLOSED
            })
    }

    pub fn handle_event(&mut self, event: Event) -> Result<Vec<Command>> {
        self.before(&event);
        let commands = self.root.handle_event(&mut self.conns, event)?;
        for command in &commands {
            self.after(command);
        }
        Ok(commands)
    }

    fn before(&mut self, event: &Event) {
        match event {
            Event::ConnectionClosed { connection } => {
                let conn = &mut self.conns[*connection];
                conn.state.remove(ConnectionState::CAN_READ);
                if conn.state == ConnectionState::CLOSED {
                    conn.timestamp_end.get_or_insert_with(SystemTime::now);
                }
            }
            Event::Quic(QuicEvent::ConnectionClosed { connection, .. }) => {
                let conn = &mut self.conns[*connection];
                conn.state = ConnectionState::CLOSED;
                conn.timestamp_end.get_or_insert_with(SystemTime::now);
            }
            Event::CommandCompleted(done) => {
                if let (CommandKind::OpenConnection { connection }, Reply::OpenConnection(reply)) =
                    (&done.command.kind, &done.reply)
                {
                    let conn = &mut self.conns[*connection];
                    match reply {
                        None => {
                            conn.state = ConnectionState::OPEN;
                            conn.timestamp_start = Some(SystemTime::now());
                        }
                        Some(err) => {
                            debug!("[handler] {} failed to open: {}", connection, err);
                            conn.error = Some(err.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn after(&mut self, command: &Command) {
        if let CommandKind::CloseConnection { connection, half_close } = command.kind {
            let conn = &mut self.conns[connection];
            if half_close {
                conn.state.remove(ConnectionState::CAN_WRITE);
            } else {
                conn.state = ConnectionState::CLOSED;
            }
            if conn.state == ConnectionState::CLOSED {
                conn.timestamp_end.get_or_insert_with(SystemTime::now);
            }
        }
    }
}
