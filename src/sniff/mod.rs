//! Byte sniffers used to pick the next layer
//!
//! Everything here is a pure function over buffered bytes:
//! - TLS/DTLS record magic and ClientHello parsing
//! - QUIC packet heuristic and Initial packet ClientHello extraction
//! - HTTP request Host header and the HTTP-vs-raw heuristic

pub mod http;
pub mod quic;
pub mod tls;

use thiserror::Error;

/// The parts of a ClientHello the router cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHello {
    pub sni: Option<String>,
    pub alpn_protocols: Vec<Vec<u8>>,
}

/// Errors while parsing handshake bytes. Callers treat any of these as
/// "no ClientHello available".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer too short: need at least {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },

    #[error("not a handshake record (content type {0:#04x})")]
    NotHandshake(u8),

    #[error("not a ClientHello (handshake type {0:#04x})")]
    NotClientHello(u8),

    #[error("not a QUIC Initial packet")]
    NotInitialPacket,

    #[error("unsupported QUIC version for decryption: {0:#010x}")]
    UnsupportedVersion(u32),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid varint encoding")]
    InvalidVarint,

    #[error("malformed handshake: {0}")]
    Malformed(String),
}

/// Bounds-checked big-endian reader over a byte slice
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.buf.len()).ok_or(
            ParseError::BufferTooShort {
                need: self.pos.saturating_add(n),
                have: self.buf.len(),
            },
        )?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self) -> Result<usize, ParseError> {
        let b = self.take(3)?;
        Ok(usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]))
    }

    /// A vector with a one-byte length prefix
    pub(crate) fn vec8(&mut self) -> Result<&'a [u8], ParseError> {
        let len = self.u8()?;
        self.take(usize::from(len))
    }

    /// A vector with a two-byte length prefix
    pub(crate) fn vec16(&mut self) -> Result<&'a [u8], ParseError> {
        let len = self.u16()?;
        self.take(usize::from(len))
    }
}
