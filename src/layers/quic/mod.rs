//! QUIC stream demultiplexing
//!
//! The QUIC handshake itself is done by an external `ServerQuic`/`ClientQuic`
//! layer pair. Below it, [`RawQuicLayer`] turns the streams of one QUIC
//! connection into independent TCP-like virtual connections, each driven by
//! its own layer stack.

mod commands;
mod events;
mod raw;

pub use commands::QuicCommand;
pub use events::QuicEvent;
pub use raw::{QuicStreamLayer, RawQuicLayer};

/// Stream ids with the low bit clear are opened by the client
pub fn stream_is_client_initiated(stream_id: u64) -> bool {
    stream_id & 0x1 == 0
}

/// Stream ids with the second bit set carry data in one direction only
pub fn stream_is_unidirectional(stream_id: u64) -> bool {
    stream_id & 0x2 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_bits() {
        assert!(stream_is_client_initiated(0) && !stream_is_unidirectional(0));
        assert!(!stream_is_client_initiated(1) && !stream_is_unidirectional(1));
        assert!(stream_is_client_initiated(2) && stream_is_unidirectional(2));
        assert!(!stream_is_client_initiated(7) && stream_is_unidirectional(7));
    }
}
