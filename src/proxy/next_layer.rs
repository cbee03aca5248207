//! Placeholder for a layer that has not been decided yet
//!
//! The marker buffers every event until the [`Router`](crate::router::Router)
//! picks a stack, replays the buffer into that stack and from then on forwards
//! everything to it.

use tracing::debug;

use crate::common::{ConnectionId, Connections};
use crate::error::Result;

use super::{Command, Context, Event, Layer, LayerHandle, LayerKind, Protocol};

enum State {
    Pending { events: Vec<Event> },
    Resolved(Layer),
}

pub struct NextLayer {
    context: Context,
    ask_on_start: bool,
    state: State,
}

impl NextLayer {
    /// A marker for `cx`. It never appears in any context's layer list.
    pub fn layer(cx: &Context, ask_on_start: bool) -> Layer {
        let marker = NextLayer {
            context: cx.clone(),
            ask_on_start,
            state: State::Pending { events: Vec::new() },
        };
        Layer::new(cx, LayerHandle::new(LayerKind::NextLayer), marker)
    }

    fn buffered(&self, connection: ConnectionId) -> Vec<u8> {
        let State::Pending { events } = &self.state else {
            return Vec::new();
        };
        events
            .iter()
            .filter_map(|e| match e {
                Event::DataReceived { connection: c, data } if *c == connection => Some(&data[..]),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Bytes the client sent before a decision was made
    pub fn data_client(&self) -> Vec<u8> {
        self.buffered(self.context.client)
    }

    /// Bytes the server sent before a decision was made
    pub fn data_server(&self) -> Vec<u8> {
        self.buffered(self.context.server)
    }

    fn ask(&mut self, conns: &mut Connections) -> Result<Vec<Command>> {
        let data_client = self.data_client();
        let data_server = self.data_server();
        let stack = match self.context.services.router.next_layer(
            &self.context,
            conns,
            &data_client,
            &data_server,
        ) {
            Ok(stack) => stack,
            Err(_) => {
                debug!(
                    "[next_layer] Deferring layer decision, not enough data ({} bytes)",
                    data_client.len()
                );
                return Ok(Vec::new());
            }
        };
        debug!("[next_layer] {} -> {:?}", self.context.client, stack.kinds());

        let mut layer = stack.build(&self.context, conns)?;
        let events = match &mut self.state {
            State::Pending { events } => std::mem::take(events),
            State::Resolved(_) => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for event in events {
            out.extend(layer.handle_event(conns, event)?);
        }
        self.state = State::Resolved(layer);
        Ok(out)
    }
}

impl Protocol for NextLayer {
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        let events = match &mut self.state {
            State::Resolved(layer) => return layer.handle_event(conns, event),
            State::Pending { events } => events,
        };

        let ask = match &event {
            Event::Start => self.ask_on_start,
            Event::DataReceived { .. } => true,
            _ => false,
        };
        let client_closed =
            matches!(&event, Event::ConnectionClosed { connection } if *connection == self.context.client);
        events.push(event);

        if client_closed {
            return Ok(vec![Command::close_connection(self.context.client)]);
        }
        if ask {
            return self.ask(conns);
        }
        Ok(Vec::new())
    }

    fn child(&self) -> Option<&Layer> {
        match &self.state {
            State::Resolved(layer) => Some(layer),
            State::Pending { .. } => None,
        }
    }
}
