//! TLS and DTLS sniffing

use super::{ClientHello, ParseError, Reader};

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_ALPN: u16 = 0x0010;

/// First bytes look like a TLS handshake record (SSLv3 up to TLS 1.2 framing)
pub fn starts_like_tls_record(data: &[u8]) -> bool {
    data.len() > 2 && data[0] == CONTENT_TYPE_HANDSHAKE && data[1] == 0x03 && data[2] <= 0x03
}

/// First bytes look like a DTLS 1.0/1.2 handshake record
pub fn starts_like_dtls_record(data: &[u8]) -> bool {
    data.len() > 2
        && data[0] == CONTENT_TYPE_HANDSHAKE
        && data[1] == 0xfe
        && (data[2] == 0xfd || data[2] == 0xfe)
}

/// Read a ClientHello spread over one or more TLS records.
///
/// Returns `Ok(None)` while the ClientHello is incomplete.
pub fn parse_client_hello(data: &[u8]) -> Result<Option<ClientHello>, ParseError> {
    let mut handshake = Vec::new();
    let mut offset = 0;
    loop {
        let Some(header) = data.get(offset..offset + 5) else {
            return Ok(None);
        };
        if header[0] != CONTENT_TYPE_HANDSHAKE {
            return Err(ParseError::NotHandshake(header[0]));
        }
        if header[1] != 0x03 {
            return Err(ParseError::Malformed(format!(
                "unexpected record version {:#04x}{:02x}",
                header[1], header[2]
            )));
        }
        let len = usize::from(u16::from_be_bytes([header[3], header[4]]));
        let Some(body) = data.get(offset + 5..offset + 5 + len) else {
            return Ok(None);
        };
        handshake.extend_from_slice(body);
        offset += 5 + len;

        if let Some(message) = complete_message(&handshake)? {
            return parse_client_hello_body(message, false).map(Some);
        }
    }
}

/// Read a ClientHello from DTLS records, reassembling handshake fragments.
///
/// Returns `Ok(None)` while the ClientHello is incomplete.
pub fn dtls_parse_client_hello(data: &[u8]) -> Result<Option<ClientHello>, ParseError> {
    let mut message = Vec::new();
    let mut total = None;
    let mut records = Reader::new(data);

    while !records.is_empty() {
        let Ok(header) = records.take(13) else {
            return Ok(None);
        };
        if header[0] != CONTENT_TYPE_HANDSHAKE {
            return Err(ParseError::NotHandshake(header[0]));
        }
        let len = usize::from(u16::from_be_bytes([header[11], header[12]]));
        let Ok(body) = records.take(len) else {
            return Ok(None);
        };

        let mut fragments = Reader::new(body);
        while !fragments.is_empty() {
            let msg_type = fragments.u8()?;
            if msg_type != HANDSHAKE_CLIENT_HELLO {
                return Err(ParseError::NotClientHello(msg_type));
            }
            let length = fragments.u24()?;
            fragments.take(2)?; // message_seq
            let fragment_offset = fragments.u24()?;
            let fragment_length = fragments.u24()?;
            let fragment = fragments.take(fragment_length)?;

            match total {
                Some(t) if t != length => {
                    return Err(ParseError::Malformed("ClientHello length changed".into()))
                }
                _ => total = Some(length),
            }
            if fragment_offset > message.len() {
                return Err(ParseError::Malformed("gap between DTLS fragments".into()));
            }
            let end = fragment_offset + fragment.len();
            if end > message.len() {
                message.extend_from_slice(&fragment[message.len() - fragment_offset..]);
            }
        }

        if let Some(length) = total {
            if message.len() >= length {
                return parse_client_hello_body(&message[..length], true).map(Some);
            }
        }
    }
    Ok(None)
}

/// The body of the first handshake message once it is complete
pub(crate) fn complete_message(handshake: &[u8]) -> Result<Option<&[u8]>, ParseError> {
    if handshake.len() < 4 {
        return Ok(None);
    }
    if handshake[0] != HANDSHAKE_CLIENT_HELLO {
        return Err(ParseError::NotClientHello(handshake[0]));
    }
    let len = usize::from(handshake[1]) << 16 | usize::from(handshake[2]) << 8 | usize::from(handshake[3]);
    Ok(handshake.get(4..4 + len))
}

/// Parse a ClientHello message body (after the handshake header)
pub(crate) fn parse_client_hello_body(body: &[u8], dtls: bool) -> Result<ClientHello, ParseError> {
    let mut r = Reader::new(body);
    r.take(2)?; // legacy_version
    r.take(32)?; // random
    r.vec8()?; // legacy_session_id
    if dtls {
        r.vec8()?; // cookie
    }
    let suites = r.vec16()?;
    if suites.is_empty() || suites.len() % 2 != 0 {
        return Err(ParseError::Malformed("invalid cipher suite list".into()));
    }
    r.vec8()?; // compression methods

    let mut hello = ClientHello::default();
    if r.is_empty() {
        return Ok(hello);
    }
    let mut extensions = Reader::new(r.vec16()?);
    while !extensions.is_empty() {
        let ext_type = extensions.u16()?;
        let data = extensions.vec16()?;
        match ext_type {
            EXT_SERVER_NAME => hello.sni = parse_server_name(data)?,
            EXT_ALPN => hello.alpn_protocols = parse_alpn(data)?,
            _ => {}
        }
    }
    Ok(hello)
}

fn parse_server_name(data: &[u8]) -> Result<Option<String>, ParseError> {
    let mut names = Reader::new(Reader::new(data).vec16()?);
    while !names.is_empty() {
        let name_type = names.u8()?;
        let name = names.vec16()?;
        if name_type == 0 {
            let name = std::str::from_utf8(name)
                .map_err(|_| ParseError::Malformed("server name is not UTF-8".into()))?;
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}

fn parse_alpn(data: &[u8]) -> Result<Vec<Vec<u8>>, ParseError> {
    let mut protocols = Reader::new(Reader::new(data).vec16()?);
    let mut out = Vec::new();
    while !protocols.is_empty() {
        out.push(protocols.vec8()?.to_vec());
    }
    Ok(out)
}
