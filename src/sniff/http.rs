//! HTTP request sniffing

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::router::NeedsMoreData;

lazy_static! {
    static ref REQUEST_LINE: Regex = Regex::new(r"(?i-u)^[A-Z]{3,}.+HTTP/").expect("valid regex");
    static ref HOST_HEADER: Regex =
        Regex::new(r"(?i-u)\r\nHost:[ \t]+([^\r\n]+?)[ \t]*\r\n").expect("valid regex");
}

/// The Host header of a buffered HTTP/1 request.
///
/// Returns `Ok(None)` when the bytes do not look like a request line and
/// `Err(NeedsMoreData)` when they do but the header block is not complete yet.
pub fn host_header(data: &[u8]) -> Result<Option<String>, NeedsMoreData> {
    if !REQUEST_LINE.is_match(data) {
        return Ok(None);
    }
    let end = find(data, b"\r\n\r\n").ok_or(NeedsMoreData)?;
    let headers = &data[..end + 2];
    Ok(HOST_HEADER
        .captures(headers)
        .and_then(|c| c.get(1))
        .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
        .map(str::to_owned))
}

/// Whether the client bytes are unlikely to be an HTTP/1 request line
pub fn probably_no_http(data_client: &[u8], data_server: &[u8]) -> bool {
    if data_client.len() < 3 || !data_server.is_empty() {
        return true;
    }
    let space = data_client.iter().position(|&b| b == b' ');
    let newline = data_client.iter().position(|&b| b == b'\n');
    let request_line_shape = match (space, newline) {
        (Some(space), Some(newline)) => space < newline,
        _ => false,
    };
    !request_line_shape
        || !data_client[..3].iter().all(u8::is_ascii_alphabetic)
        || data_client.starts_with(b"SSH")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_header() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(host_header(req), Ok(Some("example.com".to_string())));

        let req = b"get /x HTTP/1.1\r\nAccept: */*\r\nhost:\texample.org:8080  \r\n\r\n";
        assert_eq!(host_header(req), Ok(Some("example.org:8080".to_string())));
    }

    #[test]
    fn test_host_header_incomplete() {
        assert_eq!(host_header(b"GET / HTTP/1.1\r\nHost: example.com\r\n"), Err(NeedsMoreData));
    }

    #[test]
    fn test_host_header_missing() {
        assert_eq!(host_header(b"GET / HTTP/1.1\r\n\r\n"), Ok(None));
        assert_eq!(host_header(b"\x16\x03\x01\x00"), Ok(None));
        assert_eq!(host_header(b"SSH-2.0-OpenSSH_9.0\r\n"), Ok(None));
    }

    #[test]
    fn test_probably_no_http() {
        assert!(!probably_no_http(b"GET / HTTP/1.1\r\n", b""));
        assert!(!probably_no_http(b"CONNECT example.com:443 HTTP/1.1\r\n", b""));
        assert!(probably_no_http(b"GE", b""));
        assert!(probably_no_http(b"GET / HTTP/1.1\r\n", b"220 ready\r\n"));
        assert!(probably_no_http(b"SSH-2.0-OpenSSH_9.0\r\n", b""));
        assert!(probably_no_http(b"HELO\r\nhi there", b""));
        assert!(probably_no_http(b"\x00\x01\x02 x\n", b""));
        assert!(probably_no_http(b"GET / HTTP/1.1", b""));
    }
}
