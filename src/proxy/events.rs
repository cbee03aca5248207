//! Events delivered to layers by the driver or by parent layers

use bytes::Bytes;

use crate::common::ConnectionId;
use crate::layers::quic::QuicEvent;

use super::{Command, CommandId};

/// Result of a completed command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `None` on success, the error message otherwise
    OpenConnection(Option<String>),
    Wakeup,
    Done,
}

/// Completion of a blocking command or wakeup
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCompleted {
    pub command: Command,
    pub reply: Reply,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// First event every layer receives
    Start,
    DataReceived { connection: ConnectionId, data: Bytes },
    ConnectionClosed { connection: ConnectionId },
    CommandCompleted(CommandCompleted),
    /// Bytes injected by a user, to be sent on `connection`
    MessageInjected { connection: ConnectionId, data: Bytes },
    Quic(QuicEvent),
}

impl Event {
    pub fn data_received(connection: ConnectionId, data: impl Into<Bytes>) -> Self {
        Event::DataReceived {
            connection,
            data: data.into(),
        }
    }

    pub fn completed(command: Command, reply: Reply) -> Self {
        Event::CommandCompleted(CommandCompleted { command, reply })
    }

    /// Whether this event completes the given command
    pub fn completes(&self, id: CommandId) -> bool {
        matches!(self, Event::CommandCompleted(c) if c.command.id == id)
    }

    /// The connection this event concerns, if any
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Event::DataReceived { connection, .. }
            | Event::ConnectionClosed { connection }
            | Event::MessageInjected { connection, .. } => Some(*connection),
            Event::Quic(quic) => Some(quic.connection()),
            Event::Start | Event::CommandCompleted(_) => None,
        }
    }
}
