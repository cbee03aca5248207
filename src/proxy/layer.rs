//! Layer execution engine
//!
//! A [`Protocol`] is a step function: it consumes one event and returns the
//! commands it produces. [`Layer`] wraps a protocol with the pause/resume
//! machinery that makes blocking commands behave like synchronous calls:
//!
//! ```text
//!            event
//!              │
//!     ┌────────▼────────┐   paused and not our completion
//!     │      Layer      ├───────────────► queue (FIFO)
//!     └────────┬────────┘                    │
//!              │ step(event)                 │ drained after resume
//!     ┌────────▼────────┐                    │
//!     │    Protocol     │◄───────────────────┘
//!     └────────┬────────┘
//!              │ commands (stop after the first blocking one)
//!              ▼
//! ```
//!
//! The protocol keeps its own continuation state. When it returns a
//! blocking command, that command must be the last one of the step; the
//! completion is later delivered to `step` as a `CommandCompleted` event.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::common::Connections;
use crate::error::{Error, Result};

use super::{Blocking, Command, CommandId, Context, Event, LayerHandle, LayerId, LayerKind};

const MAX_LOG_STATEMENT_SIZE: usize = 2048;

/// Protocol logic driven by a [`Layer`]
pub trait Protocol: Send {
    /// Advance the state machine by one event
    fn step(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>>;

    /// The layer this protocol forwards to, for stack introspection
    fn child(&self) -> Option<&Layer> {
        None
    }
}

pub struct Layer {
    handle: LayerHandle,
    protocol: Box<dyn Protocol>,
    paused: Option<CommandId>,
    queue: VecDeque<Event>,
    /// Indentation for engine debug logs, `None` unless `proxy_debug` is set
    debug: Option<String>,
}

impl Layer {
    pub fn new<P: Protocol + 'static>(cx: &Context, handle: LayerHandle, protocol: P) -> Self {
        Self::from_boxed(cx, handle, Box::new(protocol))
    }

    pub fn from_boxed(cx: &Context, handle: LayerHandle, protocol: Box<dyn Protocol>) -> Self {
        let debug = cx
            .options
            .proxy_debug
            .then(|| "  ".repeat(cx.layers().len()));
        Self {
            handle,
            protocol,
            paused: None,
            queue: VecDeque::new(),
            debug,
        }
    }

    pub fn handle(&self) -> LayerHandle {
        self.handle
    }

    pub fn id(&self) -> LayerId {
        self.handle.id
    }

    pub fn kind(&self) -> LayerKind {
        self.handle.kind
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Command this layer is waiting on
    pub fn paused_on(&self) -> Option<CommandId> {
        self.paused
    }

    /// Number of events buffered while paused
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn child(&self) -> Option<&Layer> {
        self.protocol.child()
    }

    /// Kinds of this layer and every layer below it. Resolved `NextLayer`
    /// markers are transparent.
    pub fn stack_kinds(&self) -> Vec<LayerKind> {
        let mut kinds = Vec::new();
        let mut current = Some(self);
        while let Some(layer) = current {
            let child = layer.child();
            if !(layer.kind() == LayerKind::NextLayer && child.is_some()) {
                kinds.push(layer.kind());
            }
            current = child;
        }
        kinds
    }

    pub fn handle_event(&mut self, conns: &mut Connections, event: Event) -> Result<Vec<Command>> {
        let mut out = Vec::new();
        match self.paused {
            Some(waiting) if event.completes(waiting) => {
                self.trace(">>", &event);
                self.paused = None;
                self.process(conns, event, &mut out)?;
                while self.paused.is_none() {
                    let Some(event) = self.queue.pop_front() else {
                        break;
                    };
                    self.trace("!>", &event);
                    self.process(conns, event, &mut out)?;
                }
            }
            Some(_) => {
                self.trace(">!", &event);
                self.queue.push_back(event);
            }
            None => {
                self.trace(">>", &event);
                self.process(conns, event, &mut out)?;
            }
        }
        Ok(out)
    }

    fn process(&mut self, conns: &mut Connections, event: Event, out: &mut Vec<Command>) -> Result<()> {
        let mut commands = self.protocol.step(conns, event)?.into_iter();
        while let Some(mut command) = commands.next() {
            if command.blocking == Blocking::Pending {
                command.blocking = Blocking::Owner(self.handle.id);
                self.paused = Some(command.id);
                self.trace("<<", &command);
                out.push(command);
                if let Some(extra) = commands.next() {
                    return Err(Error::Protocol(format!(
                        "{:?} emitted {:?} after a blocking command",
                        self.handle.kind, extra.kind
                    )));
                }
                break;
            }
            self.trace("<<", &command);
            out.push(command);
        }
        Ok(())
    }

    fn trace(&self, arrow: &str, what: &dyn fmt::Debug) {
        let Some(indent) = &self.debug else {
            return;
        };
        let mut message = format!("{:?}", what);
        if let Some((cut, _)) = message.char_indices().nth(MAX_LOG_STATEMENT_SIZE) {
            message.truncate(cut);
            message.push('…');
        }
        debug!("{}{} [{:?}] {}", indent, arrow, self.handle.kind, message);
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("kind", &self.handle.kind)
            .field("id", &self.handle.id)
            .field("paused", &self.paused)
            .field("queued", &self.queue.len())
            .finish()
    }
}
