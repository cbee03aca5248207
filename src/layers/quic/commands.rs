use bytes::Bytes;

use crate::common::ConnectionId;

/// Commands for a QUIC connection, emitted once stream traffic has been
/// translated back onto the physical connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuicCommand {
    SendStreamData {
        connection: ConnectionId,
        stream_id: u64,
        data: Bytes,
        end_stream: bool,
    },
    /// Abort sending on a stream (RESET_STREAM)
    ResetStream {
        connection: ConnectionId,
        stream_id: u64,
        error_code: u64,
    },
    /// Ask the peer to stop sending on a stream (STOP_SENDING)
    StopSending {
        connection: ConnectionId,
        stream_id: u64,
        error_code: u64,
    },
    CloseConnection {
        connection: ConnectionId,
        error_code: u64,
        frame_type: Option<u64>,
        reason_phrase: String,
    },
}

impl QuicCommand {
    pub fn connection(&self) -> ConnectionId {
        match self {
            QuicCommand::SendStreamData { connection, .. }
            | QuicCommand::ResetStream { connection, .. }
            | QuicCommand::StopSending { connection, .. }
            | QuicCommand::CloseConnection { connection, .. } => *connection,
        }
    }
}
