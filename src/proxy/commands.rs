//! Commands emitted by layers towards the I/O driver
//!
//! Every command carries a [`CommandId`] drawn from a process-wide counter at
//! construction time. Completion events echo the command back, so the id is
//! what correlates a reply with the layer that is waiting for it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tracing::Level;

use crate::common::ConnectionId;
use crate::layers::quic::QuicCommand;

use super::LayerId;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation id of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Blocking state of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    /// Fire and forget
    Never,
    /// The emitting layer waits for the completion; not yet claimed by a layer
    Pending,
    /// Claimed by the layer that paused on it. Parent layers pass it through.
    Owner(LayerId),
}

/// What the command asks the driver to do
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    OpenConnection { connection: ConnectionId },
    CloseConnection { connection: ConnectionId, half_close: bool },
    SendData { connection: ConnectionId, data: Bytes },
    RequestWakeup { delay: Duration },
    Log { level: Level, message: String },
    Quic(QuicCommand),
}

/// A command emitted by a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub blocking: Blocking,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: CommandId::next(),
            blocking: Blocking::Never,
            kind,
        }
    }

    /// A command whose emitter pauses until the completion arrives
    pub fn blocking(kind: CommandKind) -> Self {
        Self {
            blocking: Blocking::Pending,
            ..Self::new(kind)
        }
    }

    pub fn open_connection(connection: ConnectionId) -> Self {
        Self::blocking(CommandKind::OpenConnection { connection })
    }

    pub fn close_connection(connection: ConnectionId) -> Self {
        Self::new(CommandKind::CloseConnection {
            connection,
            half_close: false,
        })
    }

    /// Close only the write direction (TCP half-close)
    pub fn half_close(connection: ConnectionId) -> Self {
        Self::new(CommandKind::CloseConnection {
            connection,
            half_close: true,
        })
    }

    pub fn send_data(connection: ConnectionId, data: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::SendData {
            connection,
            data: data.into(),
        })
    }

    pub fn request_wakeup(delay: Duration) -> Self {
        Self::new(CommandKind::RequestWakeup { delay })
    }

    pub fn log(level: Level, message: impl Into<String>) -> Self {
        Self::new(CommandKind::Log {
            level,
            message: message.into(),
        })
    }

    pub fn quic(command: QuicCommand) -> Self {
        Self::new(CommandKind::Quic(command))
    }

    /// The connection this command targets, if any
    pub fn connection(&self) -> Option<ConnectionId> {
        match &self.kind {
            CommandKind::OpenConnection { connection }
            | CommandKind::CloseConnection { connection, .. }
            | CommandKind::SendData { connection, .. } => Some(*connection),
            CommandKind::Quic(quic) => Some(quic.connection()),
            CommandKind::RequestWakeup { .. } | CommandKind::Log { .. } => None,
        }
    }

    /// Blocking commands need their completion routed back to the emitter
    pub fn is_blocking(&self) -> bool {
        self.blocking != Blocking::Never
    }
}
