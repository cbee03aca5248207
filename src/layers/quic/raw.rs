use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::trace;

use crate::common::{
    Connection, ConnectionId, ConnectionState, Connections, QuicInitiator, QuicStreamInfo,
    TransportProtocol,
};
use crate::error::{Error, Result};
use crate::layers::{TcpLayer, UdpLayer};
use crate::proxy::{
    Command, CommandId, CommandKind, Context, Event, Layer, LayerHandle, LayerKind, NextLayer,
    Protocol, Reply,
};

use super::{stream_is_client_initiated, stream_is_unidirectional, QuicCommand, QuicEvent};

/// One QUIC stream seen as a pair of virtual TCP-like connections.
///
/// The stream layer owns no network resource. It mints the virtual client
/// and server connections and hands events straight to its child layer.
pub struct QuicStreamLayer {
    handle: LayerHandle,
    client: ConnectionId,
    server: ConnectionId,
    client_stream_id: u64,
    server_stream_id: Option<u64>,
    child: Layer,
}

impl QuicStreamLayer {
    pub fn new(cx: &Context, conns: &mut Connections, force_raw: bool, stream_id: u64) -> Self {
        let mut cx = cx.fork();

        let mut client = conns[cx.client].clone();
        client.transport = TransportProtocol::Tcp;
        client.state = match (stream_is_unidirectional(stream_id), stream_is_client_initiated(stream_id)) {
            (false, _) => ConnectionState::OPEN,
            (true, true) => ConnectionState::CAN_READ,
            (true, false) => ConnectionState::CAN_WRITE,
        };
        client.timestamp_end = None;
        let address = conns[cx.server].address.clone();
        cx.client = conns.insert(client);
        cx.server = conns.insert(Connection::server(address, TransportProtocol::Tcp));

        let handle = cx.push_layer(LayerKind::QuicStream);
        let child = if force_raw {
            let mut tcp_cx = cx.fork();
            let tcp = tcp_cx.push_layer(LayerKind::Tcp { ignore: false });
            Layer::new(&tcp_cx, tcp, TcpLayer::new(&tcp_cx, false))
        } else {
            NextLayer::layer(&cx, false)
        };

        let stream = Self {
            handle,
            client: cx.client,
            server: cx.server,
            client_stream_id: stream_id,
            server_stream_id: None,
            child,
        };
        stream.refresh_metadata(conns);
        stream
    }

    pub fn handle(&self) -> LayerHandle {
        self.handle
    }

    /// Virtual client connection of this stream
    pub fn client(&self) -> ConnectionId {
        self.client
    }

    /// Virtual server connection of this stream
    pub fn server(&self) -> ConnectionId {
        self.server
    }

    pub fn child(&self) -> &Layer {
        &self.child
    }

    /// Stream id on the client or the server QUIC connection
    pub fn stream_id(&self, client: bool) -> Option<u64> {
        if client {
            Some(self.client_stream_id)
        } else {
            self.server_stream_id
        }
    }

    /// Bind the server side of this stream to `server_stream_id`
    pub fn open_server_stream(&mut self, conns: &mut Connections, server_stream_id: u64) -> Result<()> {
        if let Some(existing) = self.server_stream_id {
            return Err(Error::Protocol(format!(
                "stream {} is already bound to server stream {}",
                self.client_stream_id, existing
            )));
        }
        self.server_stream_id = Some(server_stream_id);

        let server = &mut conns[self.server];
        server.timestamp_start = Some(SystemTime::now());
        server.state = match (
            stream_is_unidirectional(server_stream_id),
            stream_is_client_initiated(server_stream_id),
        ) {
            (false, _) => ConnectionState::OPEN,
            (true, true) => ConnectionState::CAN_WRITE,
            (true, false) => ConnectionState::CAN_READ,
        };
        self.refresh_metadata(conns);
        Ok(())
    }

    fn refresh_metadata(&self, conns: &mut Connections) {
        let info = QuicStreamInfo {
            client_stream_id: self.client_stream_id,
            server_stream_id: self.server_stream_id,
            initiator: if stream_is_client_initiated(self.client_stream_id) {
                QuicInitiator::Client
            } else {
                QuicInitiator::Server
            },
            unidirectional: stream_is_unidirectional(self.client_stream_id),
        };
        conns[self.client].quic_stream = Some(info.clone());
        conns[self.server].quic_stream = Some(info);
    }

    pub fn handle_event(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        self.child.handle_event(conns, event)
    }
}

/// Which child layer owns a connection or a pending command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Child {
    Datagram,
    /// Keyed by client stream id
    Stream(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Opening(CommandId),
    Running,
    Done,
}

/// Splits a QUIC connection into one layer stack per stream.
///
/// Datagrams and plain connection events go to a separate datagram layer
/// working on the physical connections.
pub struct RawQuicLayer {
    cx: Context,
    force_raw: bool,
    state: State,
    datagram: Layer,
    /// Stream layers by client stream id
    streams: BTreeMap<u64, QuicStreamLayer>,
    /// Server stream id to client stream id
    server_stream_ids: HashMap<u64, u64>,
    connections: HashMap<ConnectionId, Child>,
    command_sources: HashMap<CommandId, Child>,
    /// Client and server ids of streams whose layers were dropped
    finished_client: HashSet<u64>,
    finished_server: HashSet<u64>,
    /// Next id per (unidirectional, server-initiated) combination
    next_stream_id: [u64; 4],
}

impl RawQuicLayer {
    pub fn new(cx: &Context, force_raw: bool) -> Self {
        let mut datagram_cx = cx.fork();
        let datagram = if force_raw {
            let handle = datagram_cx.push_layer(LayerKind::Udp { ignore: false });
            Layer::new(&datagram_cx, handle, UdpLayer::new(&datagram_cx, false))
        } else {
            NextLayer::layer(&datagram_cx, false)
        };
        let connections = HashMap::from([(cx.client, Child::Datagram), (cx.server, Child::Datagram)]);
        Self {
            cx: cx.clone(),
            force_raw,
            state: State::Start,
            datagram,
            streams: BTreeMap::new(),
            server_stream_ids: HashMap::new(),
            connections,
            command_sources: HashMap::new(),
            finished_client: HashSet::new(),
            finished_server: HashSet::new(),
            next_stream_id: [0, 1, 2, 3],
        }
    }

    pub fn datagram_layer(&self) -> &Layer {
        &self.datagram
    }

    /// Stream layer for a client stream id
    pub fn stream(&self, client_stream_id: u64) -> Option<&QuicStreamLayer> {
        self.streams.get(&client_stream_id)
    }

    fn next_stream_id(&mut self, is_client: bool, unidirectional: bool) -> u64 {
        let index = (usize::from(unidirectional) << 1) | usize::from(!is_client);
        let stream_id = self.next_stream_id[index];
        self.next_stream_id[index] += 4;
        stream_id
    }

    fn stream_mut(&mut self, client_stream_id: u64) -> Result<&mut QuicStreamLayer> {
        self.streams
            .get_mut(&client_stream_id)
            .ok_or_else(|| Error::Protocol(format!("no layer for QUIC stream {}", client_stream_id)))
    }

    fn running(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        let out = match event {
            Event::CommandCompleted(ref done) => {
                let child = self
                    .command_sources
                    .remove(&done.command.id)
                    .ok_or(Error::UnknownCommand(done.command.id))?;
                self.event_to_child(conns, child, event)
            }
            Event::Quic(QuicEvent::StreamDataReceived { connection, stream_id, data, end_stream })
                if self.is_physical(connection) =>
            {
                self.stream_data(conns, connection, stream_id, data, end_stream)
            }
            Event::Quic(QuicEvent::StreamReset { connection, stream_id, error_code })
                if self.is_physical(connection) =>
            {
                self.stream_reset(conns, connection, stream_id, error_code)
            }
            Event::Quic(QuicEvent::ConnectionClosed { connection, error_code, frame_type, reason_phrase })
                if self.is_physical(connection) =>
            {
                self.connection_closed(conns, connection, error_code, frame_type, reason_phrase)
            }
            Event::Start => Err(Error::Protocol("[raw_quic] started twice".into())),
            event => {
                let connection = event
                    .connection()
                    .ok_or_else(|| Error::Protocol(format!("[raw_quic] unexpected event {:?}", event)))?;
                let child = *self
                    .connections
                    .get(&connection)
                    .ok_or(Error::UnknownConnection(connection))?;
                self.event_to_child(conns, child, event)
            }
        }?;
        self.prune_finished_streams(conns);
        Ok(out)
    }

    /// Drop the layers of streams closed in both directions. Their ids are
    /// remembered so late frames are not mistaken for new streams.
    fn prune_finished_streams(&mut self, conns: &Connections) {
        let finished: Vec<u64> = self
            .streams
            .iter()
            .filter(|(id, stream)| {
                conns[stream.client()].state == ConnectionState::CLOSED
                    && conns[stream.server()].state == ConnectionState::CLOSED
                    && !self.command_sources.values().any(|c| *c == Child::Stream(**id))
            })
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            let Some(stream) = self.streams.remove(&id) else {
                continue;
            };
            self.connections.remove(&stream.client());
            self.connections.remove(&stream.server());
            self.finished_client.insert(id);
            if let Some(server_stream_id) = stream.stream_id(false) {
                self.server_stream_ids.remove(&server_stream_id);
                self.finished_server.insert(server_stream_id);
            }
            trace!("[raw_quic] stream {} finished", id);
        }
    }

    fn is_physical(&self, connection: ConnectionId) -> bool {
        connection == self.cx.client || connection == self.cx.server
    }

    /// Find or create the stream layer for a stream seen on a physical connection
    fn stream_for(
        &mut self,
        conns: &mut Connections,
        from_client: bool,
        stream_id: u64,
        out: &mut Vec<Command>,
    ) -> Result<Option<u64>> {
        let finished = if from_client {
            self.finished_client.contains(&stream_id)
        } else {
            self.finished_server.contains(&stream_id)
        };
        if finished {
            trace!("[raw_quic] ignoring frame for finished stream {}", stream_id);
            return Ok(None);
        }

        let known = if from_client {
            self.streams.contains_key(&stream_id).then_some(stream_id)
        } else {
            self.server_stream_ids.get(&stream_id).copied()
        };
        if known.is_some() {
            return Ok(known);
        }

        if stream_is_client_initiated(stream_id) != from_client {
            return Err(Error::Protocol(format!(
                "[raw_quic] stream {} was not opened by the {}",
                stream_id,
                if from_client { "client" } else { "server" }
            )));
        }
        let (client_stream_id, server_stream_id) = if from_client {
            (stream_id, None)
        } else {
            let unidirectional = stream_is_unidirectional(stream_id);
            (self.next_stream_id(false, unidirectional), Some(stream_id))
        };

        let mut stream = QuicStreamLayer::new(&self.cx, conns, self.force_raw, client_stream_id);
        if let Some(server_stream_id) = server_stream_id {
            stream.open_server_stream(conns, server_stream_id)?;
            self.server_stream_ids.insert(server_stream_id, client_stream_id);
        }
        trace!(
            "[raw_quic] new stream client={} server={:?}",
            client_stream_id,
            server_stream_id
        );
        self.connections.insert(stream.client(), Child::Stream(client_stream_id));
        self.connections.insert(stream.server(), Child::Stream(client_stream_id));
        self.streams.insert(client_stream_id, stream);

        out.extend(self.event_to_child(conns, Child::Stream(client_stream_id), Event::Start)?);
        Ok(Some(client_stream_id))
    }

    fn stream_data(
        &mut self,
        conns: &mut Connections,
        connection: ConnectionId,
        stream_id: u64,
        data: Bytes,
        end_stream: bool,
    ) -> Result<Vec<Command>> {
        let from_client = connection == self.cx.client;
        let mut out = Vec::new();
        let Some(id) = self.stream_for(conns, from_client, stream_id, &mut out)? else {
            return Ok(out);
        };
        let stream = self.stream_mut(id)?;
        let conn = if from_client { stream.client() } else { stream.server() };

        if !data.is_empty() {
            out.extend(self.event_to_child(conns, Child::Stream(id), Event::DataReceived { connection: conn, data })?);
        }
        if end_stream {
            out.extend(self.close_stream_layer(conns, id, from_client)?);
        }
        Ok(out)
    }

    fn stream_reset(
        &mut self,
        conns: &mut Connections,
        connection: ConnectionId,
        stream_id: u64,
        error_code: u64,
    ) -> Result<Vec<Command>> {
        let from_client = connection == self.cx.client;
        let mut out = Vec::new();
        let Some(id) = self.stream_for(conns, from_client, stream_id, &mut out)? else {
            return Ok(out);
        };
        let opposite = self.stream_mut(id)?.stream_id(!from_client);

        // A graceful end-of-stream sent in reaction to the reset becomes a reset
        for command in self.close_stream_layer(conns, id, from_client)? {
            match command.kind {
                CommandKind::Quic(QuicCommand::SendStreamData {
                    connection,
                    stream_id,
                    ref data,
                    end_stream: true,
                }) if Some(stream_id) == opposite && data.is_empty() => {
                    out.push(Command::quic(QuicCommand::ResetStream {
                        connection,
                        stream_id,
                        error_code,
                    }));
                }
                _ => out.push(command),
            }
        }
        Ok(out)
    }

    fn connection_closed(
        &mut self,
        conns: &mut Connections,
        connection: ConnectionId,
        error_code: u64,
        frame_type: Option<u64>,
        reason_phrase: String,
    ) -> Result<Vec<Command>> {
        let from_client = connection == self.cx.client;
        let other = if from_client { self.cx.server } else { self.cx.client };
        let mut out = Vec::new();

        if conns[other].connected() {
            out.push(Command::quic(QuicCommand::CloseConnection {
                connection: other,
                error_code,
                frame_type,
                reason_phrase,
            }));
        } else {
            self.state = State::Done;
        }

        // The datagram layer sees a plain close; closing the other side is
        // already taken care of above.
        for command in self.event_to_child(conns, Child::Datagram, Event::ConnectionClosed { connection })? {
            match command.kind {
                CommandKind::CloseConnection { connection, .. } if connection == other => {}
                _ => out.push(command),
            }
        }

        let ids: Vec<u64> = self.streams.keys().copied().collect();
        for id in ids {
            let stream = self.stream_mut(id)?;
            let conn = if from_client { stream.client() } else { stream.server() };
            conns[conn].state.remove(ConnectionState::CAN_WRITE);
            for command in self.close_stream_layer(conns, id, from_client)? {
                match &command.kind {
                    CommandKind::Quic(QuicCommand::SendStreamData { data, .. }) if data.is_empty() => {}
                    _ => out.push(command),
                }
            }
        }
        Ok(out)
    }

    /// Close the incoming half of a stream's virtual connection
    fn close_stream_layer(&mut self, conns: &mut Connections, id: u64, client: bool) -> Result<Vec<Command>> {
        let stream = self.stream_mut(id)?;
        let conn = if client { stream.client() } else { stream.server() };
        let virtual_conn = &mut conns[conn];
        virtual_conn.state.remove(ConnectionState::CAN_READ);
        // a server side that was never opened has nothing to close
        if virtual_conn.timestamp_start.is_none() || virtual_conn.timestamp_end.is_some() {
            return Ok(Vec::new());
        }
        virtual_conn.timestamp_end = Some(SystemTime::now());
        self.event_to_child(conns, Child::Stream(id), Event::ConnectionClosed { connection: conn })
    }

    /// Deliver an event to a child and translate what it emits
    fn event_to_child(&mut self, conns: &mut Connections, child: Child, event: Event) -> Result<Vec<Command>> {
        let commands = match child {
            Child::Datagram => self.datagram.handle_event(conns, event)?,
            Child::Stream(id) => self.stream_mut(id)?.handle_event(conns, event)?,
        };

        let mut out = Vec::new();
        for command in commands {
            if let (Child::Stream(id), Some(connection)) = (child, command.connection()) {
                let stream = self.stream_mut(id)?;
                if connection == stream.client() || connection == stream.server() {
                    let to_client = connection == stream.client();
                    out.extend(self.stream_command(conns, id, command, to_client)?);
                    continue;
                }
            }

            if command.is_blocking() || matches!(command.kind, CommandKind::RequestWakeup { .. }) {
                self.command_sources.insert(command.id, child);
            }
            if let CommandKind::OpenConnection { connection } = command.kind {
                self.connections.insert(connection, child);
            }
            out.push(command);
        }
        Ok(out)
    }

    /// Rewrite a command against a stream's virtual connection into QUIC
    /// stream commands on the physical connection
    fn stream_command(
        &mut self,
        conns: &mut Connections,
        id: u64,
        command: Command,
        to_client: bool,
    ) -> Result<Vec<Command>> {
        let quic_conn = if to_client { self.cx.client } else { self.cx.server };
        let stream = self.stream_mut(id)?;
        let conn = if to_client { stream.client() } else { stream.server() };
        let stream_id = stream.stream_id(to_client);
        let unbound = || Error::Protocol(format!("[raw_quic] stream {} has no server stream yet", id));
        let mut out = Vec::new();

        match command.kind {
            CommandKind::SendData { ref data, .. } => {
                let stream_id = stream_id.ok_or_else(unbound)?;
                if conns[conn].state.can_write() {
                    out.push(Command::quic(QuicCommand::SendStreamData {
                        connection: quic_conn,
                        stream_id,
                        data: data.clone(),
                        end_stream: false,
                    }));
                }
            }
            CommandKind::CloseConnection { half_close, .. } => {
                let stream_id = stream_id.ok_or_else(unbound)?;
                if conns[conn].state.can_write() {
                    conns[conn].state.remove(ConnectionState::CAN_WRITE);
                    out.push(Command::quic(QuicCommand::SendStreamData {
                        connection: quic_conn,
                        stream_id,
                        data: Bytes::new(),
                        end_stream: true,
                    }));
                }
                if !half_close {
                    if stream_is_client_initiated(stream_id) == to_client || !stream_is_unidirectional(stream_id) {
                        out.push(Command::quic(QuicCommand::StopSending {
                            connection: quic_conn,
                            stream_id,
                            error_code: 0,
                        }));
                    }
                    out.extend(self.close_stream_layer(conns, id, to_client)?);
                }
            }
            CommandKind::OpenConnection { .. } => {
                if to_client || stream_id.is_some() {
                    return Err(Error::Protocol(format!(
                        "[raw_quic] cannot open {} of stream {}",
                        conn, id
                    )));
                }
                let server_stream_id = self.next_stream_id(true, stream_is_unidirectional(id));
                self.stream_mut(id)?.open_server_stream(conns, server_stream_id)?;
                self.server_stream_ids.insert(server_stream_id, id);
                // no round trip: the stream id is ours to allocate
                out.extend(self.event_to_child(
                    conns,
                    Child::Stream(id),
                    Event::completed(command, Reply::OpenConnection(None)),
                )?);
            }
            ref other => {
                return Err(Error::Protocol(format!(
                    "[raw_quic] unexpected command {:?} on stream {}",
                    other, id
                )))
            }
        }
        Ok(out)
    }
}

impl Protocol for RawQuicLayer {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        match (self.state, event) {
            (State::Start, Event::Start) => {
                if conns[self.cx.server].timestamp_start.is_none() {
                    let open = Command::open_connection(self.cx.server);
                    self.state = State::Opening(open.id);
                    return Ok(vec![open]);
                }
                self.state = State::Running;
                self.event_to_child(conns, Child::Datagram, Event::Start)
            }
            (State::Opening(id), Event::CommandCompleted(done)) if done.command.id == id => {
                if let Reply::OpenConnection(Some(_)) = done.reply {
                    self.state = State::Done;
                    return Ok(vec![Command::close_connection(self.cx.client)]);
                }
                self.state = State::Running;
                self.event_to_child(conns, Child::Datagram, Event::Start)
            }
            (State::Running, event) => self.running(conns, event),
            (State::Done, _) => Ok(Vec::new()),
            (state, event) => Err(Error::Protocol(format!(
                "[raw_quic] unexpected event {:?} in state {:?}",
                event, state
            ))),
        }
    }
}
