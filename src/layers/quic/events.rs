use bytes::Bytes;

use crate::common::ConnectionId;

/// Events reported by a QUIC connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuicEvent {
    StreamDataReceived {
        connection: ConnectionId,
        stream_id: u64,
        data: Bytes,
        end_stream: bool,
    },
    /// The peer aborted its sending side of a stream
    StreamReset {
        connection: ConnectionId,
        stream_id: u64,
        error_code: u64,
    },
    /// The whole QUIC connection is gone
    ConnectionClosed {
        connection: ConnectionId,
        error_code: u64,
        frame_type: Option<u64>,
        reason_phrase: String,
    },
}

impl QuicEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            QuicEvent::StreamDataReceived { connection, .. }
            | QuicEvent::StreamReset { connection, .. }
            | QuicEvent::ConnectionClosed { connection, .. } => *connection,
        }
    }
}
