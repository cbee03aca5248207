//! Raw UDP relay

use tracing::{debug, Level};

use crate::common::{ConnectionId, Connections};
use crate::error::{Error, Result};
use crate::proxy::{Command, CommandId, Context, Event, Protocol, Reply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Opening(CommandId),
    Relay,
    Done,
}

/// Forwards datagrams between client and server. Either side closing ends
/// the relay.
pub struct UdpLayer {
    client: ConnectionId,
    server: ConnectionId,
    ignore: bool,
    state: State,
}

impl UdpLayer {
    pub fn new(cx: &Context, ignore: bool) -> Self {
        Self {
            client: cx.client,
            server: cx.server,
            ignore,
            state: State::Start,
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

impl Protocol for UdpLayer {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        match (self.state, event) {
            (State::Start, Event::Start) => {
                if self.ignore {
                    debug!("[udp] {} relaying ignored connection", self.client);
                }
                if conns[self.server].timestamp_start.is_none() {
                    let open = Command::open_connection(self.server);
                    self.state = State::Opening(open.id);
                    return Ok(vec![open]);
                }
                self.state = State::Relay;
                Ok(Vec::new())
            }
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
            (State::Relay, Event::DataReceived { connection, data }) => {
                Ok(vec![Command::send_data(self.other(connection)?, data)])
            }
            (State::Relay, Event::MessageInjected { connection, data }) => {
                Ok(vec![Command::send_data(connection, data)])
            }
            (State::Relay, Event::ConnectionClosed { connection }) => {
                let other = self.other(connection)?;
                self.state = State::Done;
                Ok(vec![Command::close_connection(other)])
            }
            (State::Done, _) => Ok(Vec::new()),
            (state, event) => Err(Error::Protocol(format!(
                "[udp] unexpected event {:?} in state {:?}",
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

    fn udp_layer(t: &mut TestContext) -> Layer {
        let handle = t.cx.push_layer(LayerKind::Udp { ignore: false });
        Layer::new(&t.cx, handle, UdpLayer::new(&t.cx, false))
    }

    fn open(t: &mut TestContext, layer: &mut Layer) {
        let out = layer.handle_event(&mut t.conns, Event::Start).unwrap();
        assert_eq!(out.len(), 1);
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
    fn test_datagram_relay_and_close() {
        let mut t = TestContext::udp();
        let (client, server) = (t.cx.client, t.cx.server);
        let mut layer = udp_layer(&mut t);

        let open = layer.handle_event(&mut t.conns, Event::Start).unwrap().remove(0);
        assert_eq!(open.kind, CommandKind::OpenConnection { connection: server });
        let queued = layer.handle_event(&mut t.conns, Event::data_received(client, "q1")).unwrap();
        assert!(queued.is_empty());

        let out = layer
            .handle_event(&mut t.conns, Event::completed(open, Reply::OpenConnection(None)))
            .unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: server, data: "q1".into() });

        let out = layer
            .handle_event(&mut t.conns, Event::ConnectionClosed { connection: server })
            .unwrap();
        assert_eq!(
            out[0].kind,
            CommandKind::CloseConnection { connection: client, half_close: false }
        );
        assert!(layer
            .handle_event(&mut t.conns, Event::data_received(client, "late"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_server_speaks_first() {
        let mut t = TestContext::udp();
        let (client, server) = (t.cx.client, t.cx.server);
        let mut layer = udp_layer(&mut t);
        open(&mut t, &mut layer);

        let out = layer.handle_event(&mut t.conns, Event::data_received(server, "hello")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, CommandKind::SendData { connection: client, data: "hello".into() });
        let out = layer.handle_event(&mut t.conns, Event::data_received(client, "reply")).unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: server, data: "reply".into() });
    }

    #[test]
    fn test_client_close_closes_server() {
        let mut t = TestContext::udp();
        let (client, server) = (t.cx.client, t.cx.server);
        let mut layer = udp_layer(&mut t);
        open(&mut t, &mut layer);

        let out = layer
            .handle_event(&mut t.conns, Event::ConnectionClosed { connection: client })
            .unwrap();
        // no half-close for datagrams
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].kind,
            CommandKind::CloseConnection { connection: server, half_close: false }
        );
        assert!(layer
            .handle_event(&mut t.conns, Event::ConnectionClosed { connection: server })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_open_failure_closes_client() {
        let mut t = TestContext::udp();
        let client = t.cx.client;
        let mut layer = udp_layer(&mut t);
        let open = layer.handle_event(&mut t.conns, Event::Start).unwrap().remove(0);
        let out = layer
            .handle_event(
                &mut t.conns,
                Event::completed(open, Reply::OpenConnection(Some("network unreachable".into()))),
            )
            .unwrap();
        assert!(matches!(out[0].kind, CommandKind::Log { .. }));
        assert_eq!(
            out[1].kind,
            CommandKind::CloseConnection { connection: client, half_close: false }
        );
    }

    #[test]
    fn test_injected_message() {
        let mut t = TestContext::udp();
        let server = t.cx.server;
        let mut layer = udp_layer(&mut t);
        open(&mut t, &mut layer);
        let out = layer
            .handle_event(
                &mut t.conns,
                Event::MessageInjected { connection: server, data: "injected".into() },
            )
            .unwrap();
        assert_eq!(out[0].kind, CommandKind::SendData { connection: server, data: "injected".into() });
    }

    #[test]
    fn test_server_already_open() {
        let mut t = TestContext::udp();
        t.conns[t.cx.server].timestamp_start = Some(std::time::SystemTime::now());
        let mut layer = udp_layer(&mut t);
        assert!(layer.handle_event(&mut t.conns, Event::Start).unwrap().is_empty());
        let client = t.cx.client;
        assert!(matches!(
            layer.handle_event(&mut t.conns, Event::Start),
            Err(Error::Protocol(_))
        ));
        assert_eq!(
            layer.handle_event(&mut t.conns, Event::data_received(client, "x")).unwrap().len(),
            1
        );
    }
}
