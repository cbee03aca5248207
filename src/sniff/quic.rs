//! QUIC sniffing
//!
//! Two tools: a cheap heuristic deciding whether a datagram could be QUIC at
//! all, and a full Initial packet decoder that removes packet protection
//! (RFC 9001 §5) to read the ClientHello carried in CRYPTO frames.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::common::Address;

use super::tls::{complete_message, parse_client_hello_body, starts_like_dtls_record};
use super::{ClientHello, ParseError, Reader};

/// Versions recognised in long headers: v1, Q043, Q046, Q050, v2, draft-29 (T051)
pub const KNOWN_QUIC_VERSIONS: [u32; 6] = [
    0x0000_0001,
    0x5130_3433,
    0x5130_3436,
    0x5130_3530,
    0x6b33_43cf,
    0x709a_50c4,
];

/// Ports on which short-header traffic is assumed to be QUIC
pub const TYPICAL_QUIC_PORTS: [u16; 3] = [80, 443, 8443];

const QUIC_V1: u32 = 0x0000_0001;
const QUIC_V2: u32 = 0x6b33_43cf;

const INITIAL_SALT_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad,
    0xcc, 0xbb, 0x7f, 0x0a,
];

const INITIAL_SALT_V2: [u8; 20] = [
    0x0d, 0xed, 0xe3, 0xde, 0xf7, 0x00, 0xa6, 0xdb, 0x81, 0x93, 0x81, 0xbe, 0x6e, 0x26, 0x9d, 0xcb,
    0xf9, 0xbd, 0x2e, 0xd9,
];

/// Whether `data` could be the start of a QUIC packet.
///
/// 1-RTT packets are indistinguishable from noise, so anything that is not a
/// recognisable long header falls back to the destination port.
pub fn starts_like_quic(data: &[u8], server_address: Option<&Address>) -> bool {
    if data.len() < 18 || starts_like_dtls_record(data) {
        return false;
    }
    if data[0] & 0x80 != 0 {
        let version = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        if KNOWN_QUIC_VERSIONS.contains(&version) {
            return true;
        }
        // reserved for version negotiation greasing
        if version & 0x0f0f_0f0f == 0x0a0a_0a0a {
            return true;
        }
    }
    server_address.is_some_and(|addr| TYPICAL_QUIC_PORTS.contains(&addr.port()))
}

/// Extract the ClientHello from the first Initial packet in `datagram`
pub fn parse_client_hello_from_initial(datagram: &[u8]) -> Result<ClientHello, ParseError> {
    let header = InitialHeader::parse(datagram)?;
    let plaintext = decrypt_initial(&header)?;
    let crypto = reassemble_crypto_stream(&plaintext)?;
    match complete_message(&crypto)? {
        Some(message) => parse_client_hello_body(message, false),
        None => Err(ParseError::BufferTooShort {
            need: crypto.len() + 1,
            have: crypto.len(),
        }),
    }
}

pub(crate) fn read_varint(buf: &[u8]) -> Result<(u64, usize), ParseError> {
    let &first = buf.first().ok_or(ParseError::InvalidVarint)?;
    let len = 1usize << (first >> 6);
    if buf.len() < len {
        return Err(ParseError::InvalidVarint);
    }
    let mut value = u64::from(first & 0x3f);
    for &b in &buf[1..len] {
        value = (value << 8) | u64::from(b);
    }
    Ok((value, len))
}

fn take_varint(r: &mut Reader<'_>, buf: &[u8], pos: &mut usize) -> Result<u64, ParseError> {
    let (value, len) = read_varint(&buf[*pos..])?;
    r.take(len)?;
    *pos += len;
    Ok(value)
}

pub(crate) struct InitialHeader<'a> {
    version: u32,
    dcid: &'a [u8],
    /// Header bytes up to the protected packet number
    header: &'a [u8],
    /// Protected packet number followed by the ciphertext
    payload: &'a [u8],
}

impl<'a> InitialHeader<'a> {
    pub(crate) fn parse(packet: &'a [u8]) -> Result<Self, ParseError> {
        let mut r = Reader::new(packet);
        let first = r.u8()?;
        if first & 0xc0 != 0xc0 {
            return Err(ParseError::NotInitialPacket);
        }
        let version = u32::from_be_bytes(r.take(4)?.try_into().map_err(|_| ParseError::Malformed("version".into()))?);
        // QUIC v2 remaps the Initial type bits to 0b01
        let initial_type = if version == QUIC_V2 { 1 } else { 0 };
        if (first & 0x30) >> 4 != initial_type {
            return Err(ParseError::NotInitialPacket);
        }
        let dcid = r.vec8()?;
        let scid = r.vec8()?;
        if dcid.len() > 20 || scid.len() > 20 {
            return Err(ParseError::Malformed("connection id longer than 20 bytes".into()));
        }

        let mut pos = 1 + 4 + 1 + dcid.len() + 1 + scid.len();
        let token_len = take_varint(&mut r, packet, &mut pos)?;
        let token_len = usize::try_from(token_len).map_err(|_| ParseError::InvalidVarint)?;
        r.take(token_len)?;
        pos += token_len;
        let length = take_varint(&mut r, packet, &mut pos)?;
        let length = usize::try_from(length).map_err(|_| ParseError::InvalidVarint)?;
        let payload = r.take(length)?;

        Ok(Self {
            version,
            dcid,
            header: &packet[..pos],
            payload,
        })
    }
}

pub(crate) struct InitialKeys {
    pub(crate) key: [u8; 16],
    pub(crate) iv: [u8; 12],
    pub(crate) hp: [u8; 16],
}

fn hkdf_label(label: &[u8], len: usize) -> Vec<u8> {
    let mut info = Vec::with_capacity(4 + 6 + label.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push((6 + label.len()) as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(0);
    info
}

fn expand_label(hk: &Hkdf<Sha256>, label: &[u8], out: &mut [u8]) -> Result<(), ParseError> {
    hk.expand(&hkdf_label(label, out.len()), out)
        .map_err(|_| ParseError::DecryptionFailed("HKDF expand failed".into()))
}

/// Client Initial keys for `version` and the client's chosen DCID
pub(crate) fn client_initial_keys(version: u32, dcid: &[u8]) -> Result<InitialKeys, ParseError> {
    let (salt, prefix): (&[u8], &[u8]) = match version {
        QUIC_V1 => (&INITIAL_SALT_V1, b"quic "),
        QUIC_V2 => (&INITIAL_SALT_V2, b"quicv2 "),
        other => return Err(ParseError::UnsupportedVersion(other)),
    };

    let (_, initial) = Hkdf::<Sha256>::extract(Some(salt), dcid);
    let mut client_secret = [0u8; 32];
    expand_label(&initial, b"client in", &mut client_secret)?;
    let client = Hkdf::<Sha256>::from_prk(&client_secret)
        .map_err(|_| ParseError::DecryptionFailed("invalid client secret".into()))?;

    let label = |name: &[u8]| [prefix, name].concat();
    let mut keys = InitialKeys {
        key: [0; 16],
        iv: [0; 12],
        hp: [0; 16],
    };
    expand_label(&client, &label(b"key"), &mut keys.key)?;
    expand_label(&client, &label(b"iv"), &mut keys.iv)?;
    expand_label(&client, &label(b"hp"), &mut keys.hp)?;
    Ok(keys)
}

/// AES-ECB header protection mask for a 16-byte sample
pub(crate) fn header_protection_mask(hp: &[u8; 16], sample: &[u8]) -> Result<[u8; 16], ParseError> {
    let cipher = Aes128::new_from_slice(hp)
        .map_err(|e| ParseError::DecryptionFailed(format!("HP key: {}", e)))?;
    let mut mask = [0u8; 16];
    mask.copy_from_slice(sample);
    cipher.encrypt_block(GenericArray::from_mut_slice(&mut mask));
    Ok(mask)
}

pub(crate) fn packet_nonce(iv: &[u8; 12], packet_number: u64) -> [u8; 12] {
    let mut nonce = *iv;
    for (n, p) in nonce[4..].iter_mut().zip(packet_number.to_be_bytes()) {
        *n ^= p;
    }
    nonce
}

fn decrypt_initial(header: &InitialHeader<'_>) -> Result<Vec<u8>, ParseError> {
    let keys = client_initial_keys(header.version, header.dcid)?;

    let sample = header.payload.get(4..20).ok_or(ParseError::BufferTooShort {
        need: 20,
        have: header.payload.len(),
    })?;
    let mask = header_protection_mask(&keys.hp, sample)?;

    let first = header.header[0] ^ (mask[0] & 0x0f);
    let pn_len = usize::from(first & 0x03) + 1;
    let mut packet_number = 0u64;
    let mut aad = Vec::with_capacity(header.header.len() + pn_len);
    aad.push(first);
    aad.extend_from_slice(&header.header[1..]);
    for i in 0..pn_len {
        let byte = header.payload[i] ^ mask[1 + i];
        packet_number = (packet_number << 8) | u64::from(byte);
        aad.push(byte);
    }

    let cipher = Aes128Gcm::new_from_slice(&keys.key)
        .map_err(|e| ParseError::DecryptionFailed(format!("AEAD key: {}", e)))?;
    let nonce = packet_nonce(&keys.iv, packet_number);
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &header.payload[pn_len..],
                aad: &aad,
            },
        )
        .map_err(|_| ParseError::DecryptionFailed("AEAD decryption failed".into()))
}

/// Collect CRYPTO frame data into one contiguous stream starting at offset 0
fn reassemble_crypto_stream(plaintext: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut frames: Vec<(u64, &[u8])> = Vec::new();
    let mut pos = 0;
    while pos < plaintext.len() {
        let (frame_type, len) = read_varint(&plaintext[pos..])?;
        pos += len;
        match frame_type {
            // PADDING, PING
            0x00 | 0x01 => {}
            // ACK, ACK_ECN
            0x02 | 0x03 => {
                let mut fields = 4;
                let mut i = 0;
                while i < fields {
                    let (value, len) = read_varint(plaintext.get(pos..).unwrap_or_default())?;
                    pos += len;
                    if i == 2 {
                        // ACK Range Count: a gap and a length per range
                        fields += usize::try_from(value).map_err(|_| ParseError::InvalidVarint)? * 2;
                    }
                    i += 1;
                }
                if frame_type == 0x03 {
                    for _ in 0..3 {
                        let (_, len) = read_varint(plaintext.get(pos..).unwrap_or_default())?;
                        pos += len;
                    }
                }
            }
            0x06 => {
                let (offset, len) = read_varint(plaintext.get(pos..).unwrap_or_default())?;
                pos += len;
                let (length, len) = read_varint(plaintext.get(pos..).unwrap_or_default())?;
                pos += len;
                let length = usize::try_from(length).map_err(|_| ParseError::InvalidVarint)?;
                let data = plaintext.get(pos..pos + length).ok_or(ParseError::BufferTooShort {
                    need: pos + length,
                    have: plaintext.len(),
                })?;
                frames.push((offset, data));
                pos += length;
            }
            _ => break,
        }
    }

    frames.sort_by_key(|(offset, _)| *offset);
    let mut stream = Vec::new();
    for (offset, data) in frames {
        let offset = usize::try_from(offset).map_err(|_| ParseError::InvalidVarint)?;
        if offset > stream.len() {
            break;
        }
        let end = offset + data.len();
        if end > stream.len() {
            stream.extend_from_slice(&data[stream.len() - offset..]);
        }
    }
    Ok(stream)
}
