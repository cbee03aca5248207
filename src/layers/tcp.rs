//! Raw TCP relay

use tracing::{debug, Level};

use crate::common::{ConnectionId, ConnectionState, Connections};
use crate::error::{Error, Result};
use crate::proxy::{Command, CommandId, Context, Event, Protocol, Reply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Opening(CommandId),
    Relay,
    Done,
}

/// Forwards bytes between client and server unchanged.
///
/// Closing is done in halves: when one side stops sending, the other side's
/// write half is shut down. Once neither side can read, both are closed.
pub struct TcpLayer {
    client: ConnectionId,
    server: ConnectionId,
    /// Connection was excluded by `ignore_hosts`/`allow_hosts`
    ignore: bool,
    state: State,
}

impl TcpLayer {
    pub fn new(cx: &Context, ignore: bool) -> Self {
        Self {
            client: cx.client,
            server: cx.server,
            ignore,
            state: State::Start,
        }
    }

    fn start(&mut self, conns: &Connections) -> Vec<Command> {
        if self.ignore {
            debug!("[tcp] {} relaying ignored connection", self.client);
        }
        if conns[self.server].timestamp_start.is_none() {
            let open = Command::open_connection(self.server);
            self.state = State::Opening(open.id);
            return vec![open];
        }
        self.state = State::Relay;
        Vec::new()
    }

    fn relay(&mut self, conns: &Connections, event: Event) -> Result<Vec<Command>> {
        match event {
            Event::DataReceived { connection, data } => {
                Ok(vec![Command::send_data(self.other(connection)?, data)])
            }
            Event::MessageInjected { connection, data } => Ok(vec![Command::send_data(connection, data)]),
            Event::ConnectionClosed { connection } => {
                let other = self.other(connection)?;
                let client = conns[self.client].state;
                let server = conns[self.server].state;
                if client.can_read() || server.can_read() {
                    return Ok(vec![Command::half_close(other)]);
                }
                let mut out = Vec::new();
                if server != ConnectionState::CLOSED {
                    out.push(Command::close_connection(self.server));
                }
                if client != ConnectionState::CLOSED {
                    out.push(Command::close_connection(self.client));
                }
                self.state = State::Done;
                Ok(out)
            }
            event => Err(Error::Protocol(format!("[tcp] unexpected event {:?}", event))),
        }
    }

    fn other(&self, connection: ConnectionId) -> Result<ConnectionId> {
        if connection == self.client {
            Ok(self.server)
        } else if connection == self.server {
            Ok(self.client)
        } else {
            Err(Error::UnknownConnection(connection))
        }
    }
}

impl Protocol for TcpLayer {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        match (self.state, event) {
            (State::Start, Event::Start) => Ok(self.start(conns)),
            (State::Opening(id), Event::CommandCompleted(done)) if done.command.id == id => {
                if let Reply::OpenConnection(Some(err)) = done.reply {
                    self.state = State::Done;
                    return Ok(vec![
                        Command::log(Level::INFO, format!("Unable to connect to server: {}", err)),
                        Command::close_connection(self.client),
                    ]);
                }
                self.state = State::Relay;
                Ok(Vec::new())
            }
            (State::Relay, event) => self.relay(conns, event),
            (State::Done, _) => Ok(Vec::new()),
            (state, event) => Err(Error::Protocol(format!(
                "[tcp] unexpected event {:?} in state {:?}",
                event, state
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{CommandKind, Layer, LayerKind};
    use crate::testing::TestContext;

    fn tcp_layer(t: &mut TestContext) -> Layer {
        let handle = t.cx.push_layer(LayerKind::Tcp { ignore: false });
        Layer::new(&t.cx, handle, TcpLayer::new(&t.cx, false))
    }

    fn open(t: &mut TestContext, layer: &mut Layer) {
        let out = layer.handle_event(&mut t.conns, Event::Start).unwrap();
        assert_eq!(out.len(), 1);
        t.conns[t.cx.server].state = ConnectionState::OPEN;
        t.conns[t.cx.server].timestamp_start = Some(std::time::SystemTime::now());
        let out = layer
            .handle_event(
                &mut t.conns,
                Event::completed(out[0].clone(), Reply::OpenConnection(None)),
            )
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_relay_both_directions() {
        let mut t = TestContext::tcp();
        let (client, server) = (t.cx.client, t.cx.server);
        let mut layer = tcp_layer(&mut t);
        open(&mut t, &mut layer);

        let out = layer.handle_event(&mut t.conns, Event::data_received(client, "ping")).unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: server, data: "ping".into() });
        let out = layer.handle_event(&mut t.conns, Event::data_received(server, "pong")).unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: client, data: "pong".into() });
    }

    #[test]
    fn test_open_failure_closes_client() {
        let mut t = TestContext::tcp();
        let client = t.cx.client;
        let mut layer = tcp_layer(&mut t);
        let open = layer.handle_event(&mut t.conns, Event::Start).unwrap().remove(0);
        let out = layer
            .handle_event(
                &mut t.conns,
                Event::completed(open, Reply::OpenConnection(Some("connection refused".into()))),
            )
            .unwrap();
        assert!(matches!(out[0].kind, CommandKind::Log { .. }));
        assert_eq!(
            out[1].kind,
            CommandKind::CloseConnection { connection: client, half_close: false }
        );
        // inert afterwards
        assert!(layer
            .handle_event(&mut t.conns, Event::data_received(client, "late"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_half_close_then_full_close() {
        let mut t = TestContext::tcp();
        let (client, server) = (t.cx.client, t.cx.server);
        let mut layer = tcp_layer(&mut t);
        open(&mut t, &mut layer);

        t.conns[client].state.remove(ConnectionState::CAN_READ);
        let out = layer
            .handle_event(&mut t.conns, Event::ConnectionClosed { connection: client })
            .unwrap();
        assert_eq!(out[0].kind, CommandKind::CloseConnection { connection: server, half_close: true });

        t.conns[server].state.remove(ConnectionState::CAN_WRITE);
        t.conns[server].state.remove(ConnectionState::CAN_READ);
        let out = layer
            .handle_event(&mut t.conns, Event::ConnectionClosed { connection: server })
            .unwrap();
        // server is already CLOSED, only the client is left
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].kind,
            CommandKind::CloseConnection { connection: client, half_close: false }
        );
    }

    #[test]
    fn test_injected_message() {
        let mut t = TestContext::tcp();
        let client = t.cx.client;
        let mut layer = tcp_layer(&mut t);
        open(&mut t, &mut layer);
        let out = layer
            .handle_event(
                &mut t.conns,
                Event::MessageInjected { connection: client, data: "injected".into() },
            )
            .unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: client, data: "injected".into() });
    }

    #[test]
    fn test_unexpected_event_is_an_error() {
        let mut t = TestContext::tcp();
        let client = t.cx.client;
        let mut layer = tcp_layer(&mut t);
        assert!(matches!(
            layer.handle_event(&mut t.conns, Event::data_received(client, "too early")),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_server_already_open() {
        let mut t = TestContext::tcp();
        t.conns[t.cx.server].timestamp_start = Some(std::time::SystemTime::now());
        let mut layer = tcp_layer(&mut t);
        assert!(layer.handle_event(&mut t.conns, Event::Start).unwrap().is_empty());
    }
}
