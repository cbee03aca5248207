//! Protocol detection
//!
//! [`NextLayerRouter`] peeks at the bytes buffered by a `NextLayer` marker and
//! at the shape of the layer stack above it, and picks the layers to push.
//! Rules are evaluated in order and the first one that matches wins:
//!
//! 1. ignore/allow host filtering
//! 2. fixed recipes for reverse and explicit HTTP proxy modes
//! 3. TLS/DTLS record magic
//! 4. QUIC heuristic (UDP)
//! 5. `tcp_hosts`/`udp_hosts` overrides
//! 6. negotiated ALPN
//! 7. DNS ports
//! 8. raw UDP
//! 9. HTTP heuristic (TCP)

use regex::Regex;
use tracing::trace;

use crate::common::{Connection, Connections, TransportProtocol};
use crate::proxy::{Context, HttpMode, LayerKind, LayerStack, ProxyMode, ReverseScheme};
use crate::sniff::http::{host_header, probably_no_http};
use crate::sniff::quic::{parse_client_hello_from_initial, starts_like_quic};
use crate::sniff::tls::{
    dtls_parse_client_hello, parse_client_hello, starts_like_dtls_record, starts_like_tls_record,
};
use crate::sniff::ClientHello;

use super::{HostPatterns, NeedsMoreData, Router};

const HTTP_ALPNS: [&[u8]; 5] = [b"h3", b"h2", b"http/1.1", b"http/1.0", b"http/0.9"];
const DNS_PORTS: [u16; 2] = [53, 5353];

lazy_static::lazy_static! {
    static ref EXPLICIT_PORT: Regex = Regex::new(r":\d+$").expect("valid regex");
}

/// The default next-layer decision procedure
#[derive(Debug, Clone, Copy, Default)]
pub struct NextLayerRouter;

impl Router for NextLayerRouter {
    fn next_layer(
        &self,
        cx: &Context,
        conns: &Connections,
        data_client: &[u8],
        data_server: &[u8],
    ) -> Result<LayerStack, NeedsMoreData> {
        let stack = decide(cx, conns, data_client, data_server)?;
        trace!("[router] {} -> {:?}", cx.client, stack.kinds());
        Ok(stack)
    }
}

fn decide(
    cx: &Context,
    conns: &Connections,
    data_client: &[u8],
    data_server: &[u8],
) -> Result<LayerStack, NeedsMoreData> {
    let options = &cx.options;
    let client = &conns[cx.client];
    let server = &conns[cx.server];
    let tcp_based = client.transport == TransportProtocol::Tcp;
    let udp_based = client.transport == TransportProtocol::Udp;

    if ignore_connection(cx, conns, data_client, data_server)? {
        let ignore = !options.show_ignored_hosts;
        return Ok(LayerStack::from([if tcp_based {
            LayerKind::Tcp { ignore }
        } else {
            LayerKind::Udp { ignore }
        }]));
    }

    match cx.layers() {
        [root] if root.kind == LayerKind::ReverseProxy => {
            if let ProxyMode::Reverse { scheme, .. } = &cx.mode {
                return Ok(reverse_proxy(*scheme, client, data_client));
            }
        }
        [root] if matches!(root.kind, LayerKind::HttpProxy | LayerKind::HttpUpstreamProxy) => {
            return Ok(explicit_http_proxy(root.kind, client, data_client));
        }
        _ => {}
    }

    if (tcp_based && starts_like_tls_record(data_client))
        || (udp_based && starts_like_dtls_record(data_client))
    {
        return Ok(LayerStack::from([LayerKind::ServerTls, LayerKind::ClientTls]));
    }

    if udp_based && starts_like_quic(data_client, server.address.as_ref()) {
        return Ok(LayerStack::from([LayerKind::ServerQuic, LayerKind::ClientQuic]));
    }

    if tcp_based && destination_in_hosts(client, server, &options.tcp_hosts) {
        return Ok(LayerStack::from([LayerKind::Tcp { ignore: false }]));
    }
    if udp_based && destination_in_hosts(client, server, &options.udp_hosts) {
        return Ok(LayerStack::from([LayerKind::Udp { ignore: false }]));
    }

    if let Some(alpn) = &client.alpn {
        if HTTP_ALPNS.contains(&alpn.as_slice()) {
            return Ok(LayerStack::from([LayerKind::Http(HttpMode::Transparent)]));
        }
        if client.tls_version.as_deref() == Some("QUICv1") {
            return Ok(LayerStack::from([LayerKind::RawQuic { force_raw: true }]));
        }
    }

    if server
        .address
        .as_ref()
        .is_some_and(|addr| DNS_PORTS.contains(&addr.port()))
    {
        return Ok(LayerStack::from([LayerKind::Dns]));
    }

    if udp_based {
        return Ok(LayerStack::from([LayerKind::Udp { ignore: false }]));
    }

    if options.rawtcp && probably_no_http(data_client, data_server) {
        return Ok(LayerStack::from([LayerKind::Tcp { ignore: false }]));
    }
    Ok(LayerStack::from([LayerKind::Http(HttpMode::Transparent)]))
}

fn ignore_connection(
    cx: &Context,
    conns: &Connections,
    data_client: &[u8],
    data_server: &[u8],
) -> Result<bool, NeedsMoreData> {
    let options = &cx.options;
    if options.ignore_hosts.is_empty() && options.allow_hosts.is_empty() {
        return Ok(false);
    }

    let client = &conns[cx.client];
    let server = &conns[cx.server];
    let mut hostnames = Vec::new();
    if let Some(peer) = &server.peername {
        hostnames.push(peer.host_port());
    }
    if let Some(address) = &server.address {
        hostnames.push(address.host_port());
        let port = address.port();

        if client.transport == TransportProtocol::Tcp && data_server.is_empty() {
            if let Some(host) = host_header(data_client)? {
                if EXPLICIT_PORT.is_match(&host) {
                    hostnames.push(host);
                } else {
                    hostnames.push(format!("{}:{}", host, port));
                }
            }
        }
        if let Some(sni) = client_hello(client.transport, data_client)?.and_then(|ch| ch.sni) {
            hostnames.push(format!("{}:{}", sni, port));
        }
        if let Some(sni) = &client.sni {
            hostnames.push(format!("{}:{}", sni, port));
        }
    }

    if hostnames.is_empty() {
        return Ok(false);
    }
    if !options.allow_hosts.is_empty() && !options.allow_hosts.matches_any(&hostnames) {
        trace!("[router] {:?} not in allow_hosts", hostnames);
        return Ok(true);
    }
    if options.ignore_hosts.matches_any(&hostnames) {
        trace!("[router] {:?} matches ignore_hosts", hostnames);
        return Ok(true);
    }
    Ok(false)
}

/// A complete ClientHello in the client bytes, if any.
///
/// Unparsable handshakes count as absent; incomplete ones defer the decision.
fn client_hello(
    transport: TransportProtocol,
    data_client: &[u8],
) -> Result<Option<ClientHello>, NeedsMoreData> {
    match transport {
        TransportProtocol::Tcp => {
            if !starts_like_tls_record(data_client) {
                return Ok(None);
            }
            match parse_client_hello(data_client) {
                Ok(Some(hello)) => Ok(Some(hello)),
                Ok(None) => Err(NeedsMoreData),
                Err(_) => Ok(None),
            }
        }
        TransportProtocol::Udp => {
            if let Ok(hello) = parse_client_hello_from_initial(data_client) {
                return Ok(Some(hello));
            }
            if !starts_like_dtls_record(data_client) {
                return Ok(None);
            }
            match dtls_parse_client_hello(data_client) {
                Ok(Some(hello)) => Ok(Some(hello)),
                Ok(None) => Err(NeedsMoreData),
                Err(_) => Ok(None),
            }
        }
    }
}

fn destination_in_hosts(client: &Connection, server: &Connection, hosts: &HostPatterns) -> bool {
    server
        .address
        .as_ref()
        .is_some_and(|addr| hosts.is_match(&addr.host()))
        || client.sni.as_deref().is_some_and(|sni| hosts.is_match(sni))
}

fn reverse_proxy(scheme: ReverseScheme, client: &Connection, data_client: &[u8]) -> LayerStack {
    let client_tls = starts_like_tls_record(data_client);
    let client_dtls = starts_like_dtls_record(data_client);
    let http = LayerKind::Http(HttpMode::Transparent);
    let mut stack = LayerStack::new();

    match scheme {
        ReverseScheme::Http => {
            if client_tls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(http);
        }
        ReverseScheme::Https if client.transport == TransportProtocol::Udp => {
            stack.push(LayerKind::ServerQuic);
            stack.push(LayerKind::ClientQuic);
            stack.push(http);
        }
        ReverseScheme::Https => {
            stack.push(LayerKind::ServerTls);
            if client_tls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(http);
        }
        ReverseScheme::Tcp => {
            if client_tls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(LayerKind::Tcp { ignore: false });
        }
        ReverseScheme::Tls => {
            stack.push(LayerKind::ServerTls);
            if client_tls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(LayerKind::Tcp { ignore: false });
        }
        ReverseScheme::Udp => {
            if client_dtls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(LayerKind::Udp { ignore: false });
        }
        ReverseScheme::Dtls => {
            stack.push(LayerKind::ServerTls);
            if client_dtls {
                stack.push(LayerKind::ClientTls);
            }
            stack.push(LayerKind::Udp { ignore: false });
        }
        ReverseScheme::Dns => stack.push(LayerKind::Dns),
        ReverseScheme::Http3 => {
            stack.push(LayerKind::ServerQuic);
            stack.push(LayerKind::ClientQuic);
            stack.push(http);
        }
        ReverseScheme::Quic => {
            stack.push(LayerKind::ServerQuic);
            stack.push(LayerKind::ClientQuic);
            stack.push(LayerKind::RawQuic { force_raw: true });
        }
    }
    stack
}

fn explicit_http_proxy(root: LayerKind, client: &Connection, data_client: &[u8]) -> LayerStack {
    let mut stack = LayerStack::new();
    if client.transport == TransportProtocol::Udp {
        stack.push(LayerKind::ClientQuic);
    } else if starts_like_tls_record(data_client) {
        stack.push(LayerKind::ClientTls);
    }
    if root == LayerKind::HttpUpstreamProxy {
        stack.push(LayerKind::Http(HttpMode::Upstream));
    } else {
        stack.push(LayerKind::Http(HttpMode::Regular));
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Address;
    use crate::sniff::tls::tests::{client_hello_message, dtls_record, tls_records};
    use crate::testing::TestContext;

    fn decide_for(t: &TestContext, data_client: &[u8]) -> Result<Vec<LayerKind>, NeedsMoreData> {
        NextLayerRouter
            .next_layer(&t.cx, &t.conns, data_client, b"")
            .map(|stack| stack.kinds().to_vec())
    }

    fn reverse(scheme: ReverseScheme, transport: TransportProtocol) -> TestContext {
        let address = Address::domain("backend.internal", 8443);
        TestContext::with_mode(ProxyMode::Reverse { scheme, address }, transport)
    }

    const TLS_AND_DTLS: [LayerKind; 2] = [LayerKind::ServerTls, LayerKind::ClientTls];
    /// TLS record carrying a handshake that is not a ClientHello
    const NOT_CLIENT_HELLO: &[u8] = b"\x16\x03\x01\x00\x04\x02\x00\x00\x00";

    #[test]
    fn test_tls_magic_regardless_of_next_byte() {
        let t = TestContext::tcp();
        for minor in 0..=3u8 {
            for next in [0x00, 0x41, 0xff] {
                let data = [0x16, 0x03, minor, next];
                assert_eq!(decide_for(&t, &data).unwrap(), TLS_AND_DTLS);
            }
        }
    }

    #[test]
    fn test_dtls_magic_regardless_of_next_byte() {
        let t = TestContext::udp();
        for minor in [0xfd, 0xfe] {
            for next in [0x00, 0x41, 0xff] {
                let data = [0x16, 0xfe, minor, next];
                assert_eq!(decide_for(&t, &data).unwrap(), TLS_AND_DTLS);
            }
        }
    }

    #[test]
    fn test_two_bytes_never_match_tls() {
        let t = TestContext::tcp();
        assert_eq!(decide_for(&t, &[0x16, 0x03]).unwrap(), [LayerKind::Tcp { ignore: false }]);
        let t = TestContext::udp();
        assert_eq!(decide_for(&t, &[0x16, 0xfe]).unwrap(), [LayerKind::Udp { ignore: false }]);
    }

    #[test]
    fn test_tls_magic_is_transport_specific() {
        // DTLS magic on TCP is not TLS and not HTTP
        let t = TestContext::tcp();
        assert_eq!(
            decide_for(&t, &[0x16, 0xfe, 0xfd, 0x00]).unwrap(),
            [LayerKind::Tcp { ignore: false }]
        );
    }

    #[test]
    fn test_decision_is_idempotent() {
        let mut t = TestContext::tcp();
        t.options_mut().ignore_hosts = HostPatterns::new(["ignored"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("example.com", 80));

        for data in [
            &b"GET / HTTP/1.1\r\nHost: example.com\r\n"[..],
            b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n",
            b"\x16\x03\x01\x00",
            b"SSH-2.0",
        ] {
            assert_eq!(decide_for(&t, data), decide_for(&t, data));
        }
    }

    #[test]
    fn test_quic_heuristic() {
        let mut t = TestContext::udp();
        t.conns[t.cx.server].address = Some(Address::domain("example.com", 4433));
        let mut initial = vec![0xc0, 0x00, 0x00, 0x00, 0x01];
        initial.resize(1200, 0);
        assert_eq!(
            decide_for(&t, &initial).unwrap(),
            [LayerKind::ServerQuic, LayerKind::ClientQuic]
        );
        assert_eq!(decide_for(&t, &initial[..17]).unwrap(), [LayerKind::Udp { ignore: false }]);
    }

    #[test]
    fn test_http_heuristic() {
        let t = TestContext::tcp();
        assert_eq!(
            decide_for(&t, b"GET / HTTP/1.1\r\n").unwrap(),
            [LayerKind::Http(HttpMode::Transparent)]
        );
        assert_eq!(decide_for(&t, b"SSH-2.0-x y\n").unwrap(), [LayerKind::Tcp { ignore: false }]);

        let server_first = NextLayerRouter
            .next_layer(&t.cx, &t.conns, b"GET / HTTP/1.1\r\n", b"220 smtp ready\r\n")
            .unwrap();
        assert_eq!(server_first.kinds(), [LayerKind::Tcp { ignore: false }]);
    }

    #[test]
    fn test_rawtcp_disabled() {
        let mut t = TestContext::tcp();
        t.options_mut().rawtcp = false;
        assert_eq!(
            decide_for(&t, b"\x00\x01binary").unwrap(),
            [LayerKind::Http(HttpMode::Transparent)]
        );
    }

    #[test]
    fn test_dns_port() {
        let mut t = TestContext::udp();
        t.conns[t.cx.server].address = Some(Address::domain("1.1.1.1", 53));
        assert_eq!(decide_for(&t, b"\x12\x34\x01\x00").unwrap(), [LayerKind::Dns]);

        let mut t = TestContext::tcp();
        t.conns[t.cx.server].address = Some(Address::domain("resolver", 5353));
        assert_eq!(decide_for(&t, b"\x00\x1c\x12\x34").unwrap(), [LayerKind::Dns]);
    }

    #[test]
    fn test_alpn() {
        let mut t = TestContext::tcp();
        t.conns[t.cx.client].alpn = Some(b"h2".to_vec());
        assert_eq!(decide_for(&t, b"").unwrap(), [LayerKind::Http(HttpMode::Transparent)]);

        let mut t = TestContext::udp();
        let client = t.cx.client;
        t.conns[client].alpn = Some(b"doq".to_vec());
        t.conns[client].tls_version = Some("QUICv1".into());
        assert_eq!(decide_for(&t, b"").unwrap(), [LayerKind::RawQuic { force_raw: true }]);
    }

    #[test]
    fn test_tcp_and_udp_hosts() {
        let mut t = TestContext::tcp();
        t.options_mut().tcp_hosts = HostPatterns::new(["^example\\.com$"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("example.com", 80));
        assert_eq!(
            decide_for(&t, b"GET / HTTP/1.1\r\n").unwrap(),
            [LayerKind::Tcp { ignore: false }]
        );

        let mut t = TestContext::udp();
        t.options_mut().udp_hosts = HostPatterns::new(["example"]).unwrap();
        t.conns[t.cx.client].sni = Some("example.org".into());
        assert_eq!(decide_for(&t, b"\x01\x02\x03").unwrap(), [LayerKind::Udp { ignore: false }]);
    }

    #[test]
    fn test_ignore_hosts_by_address() {
        let mut t = TestContext::tcp();
        t.options_mut().ignore_hosts = HostPatterns::new(["^example\\.com:443$"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("example.com", 443));
        assert_eq!(decide_for(&t, b"\x16\x03\x01\x00\x05"), Err(NeedsMoreData));
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), [LayerKind::Tcp { ignore: true }]);

        t.options_mut().show_ignored_hosts = true;
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), [LayerKind::Tcp { ignore: false }]);
    }

    #[test]
    fn test_ignore_hosts_by_host_header() {
        let mut t = TestContext::tcp();
        t.options_mut().ignore_hosts = HostPatterns::new(["^internal\\.example:80$"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("10.0.0.1", 80));

        assert_eq!(decide_for(&t, b"GET / HTTP/1.1\r\nHost: internal.example\r\n"), Err(NeedsMoreData));
        assert_eq!(
            decide_for(&t, b"GET / HTTP/1.1\r\nHost: internal.example\r\n\r\n").unwrap(),
            [LayerKind::Tcp { ignore: true }]
        );
        assert_eq!(
            decide_for(&t, b"GET / HTTP/1.1\r\nHost: public.example\r\n\r\n").unwrap(),
            [LayerKind::Http(HttpMode::Transparent)]
        );
    }

    #[test]
    fn test_ignore_hosts_by_sni() {
        let mut t = TestContext::tcp();
        t.options_mut().ignore_hosts = HostPatterns::new(["^pinned\\.example:443$"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("192.0.2.7", 443));

        let records = tls_records(&client_hello_message(Some("pinned.example"), &[b"h2"], false), 64);
        assert_eq!(decide_for(&t, &records[..40]), Err(NeedsMoreData));
        assert_eq!(decide_for(&t, &records).unwrap(), [LayerKind::Tcp { ignore: true }]);

        let other = tls_records(&client_hello_message(Some("other.example"), &[], false), 512);
        assert_eq!(decide_for(&t, &other).unwrap(), TLS_AND_DTLS);

        // malformed ClientHello: no SNI, decision goes on
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), TLS_AND_DTLS);
    }

    #[test]
    fn test_ignore_hosts_by_dtls_sni() {
        let mut t = TestContext::udp();
        t.options_mut().ignore_hosts = HostPatterns::new(["^pinned\\.example"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("192.0.2.7", 4433));

        let record = dtls_record(&client_hello_message(Some("pinned.example"), &[], true));
        assert_eq!(decide_for(&t, &record[..20]), Err(NeedsMoreData));
        assert_eq!(decide_for(&t, &record).unwrap(), [LayerKind::Udp { ignore: true }]);
    }

    #[test]
    fn test_allow_hosts() {
        let mut t = TestContext::tcp();
        t.options_mut().allow_hosts = HostPatterns::new(["example\\.com"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("example.org", 443));
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), [LayerKind::Tcp { ignore: true }]);

        t.conns[t.cx.server].address = Some(Address::domain("www.example.com", 443));
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), TLS_AND_DTLS);
    }

    #[test]
    fn test_no_hostnames_is_not_ignored() {
        let mut t = TestContext::tcp();
        t.options_mut().allow_hosts = HostPatterns::new(["example\\.com"]).unwrap();
        assert_eq!(decide_for(&t, b"\x16\x03\x01").unwrap(), TLS_AND_DTLS);
    }

    #[test]
    fn test_explicit_proxy_connect() {
        let t = TestContext::with_mode(ProxyMode::Regular, TransportProtocol::Tcp);
        let data = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(decide_for(&t, data).unwrap(), [LayerKind::Http(HttpMode::Regular)]);
        assert_eq!(
            decide_for(&t, b"\x16\x03\x01\x02\x00").unwrap(),
            [LayerKind::ClientTls, LayerKind::Http(HttpMode::Regular)]
        );
    }

    #[test]
    fn test_explicit_upstream_proxy() {
        let mode = ProxyMode::Upstream {
            address: Address::domain("upstream.internal", 3128),
        };
        let t = TestContext::with_mode(mode, TransportProtocol::Tcp);
        assert_eq!(
            decide_for(&t, b"GET http://a/ HTTP/1.1\r\n\r\n").unwrap(),
            [LayerKind::Http(HttpMode::Upstream)]
        );
    }

    #[test]
    fn test_explicit_proxy_only_at_root() {
        let mut t = TestContext::with_mode(ProxyMode::Regular, TransportProtocol::Tcp);
        t.cx.push_layer(LayerKind::Http(HttpMode::Regular));
        assert_eq!(decide_for(&t, b"\x16\x03\x01\x02\x00").unwrap(), TLS_AND_DTLS);
    }

    #[test]
    fn test_reverse_recipes() {
        use LayerKind::*;
        use ReverseScheme as S;
        use TransportProtocol::{Tcp as T, Udp as U};
        let http = Http(HttpMode::Transparent);
        let tls: &[u8] = b"\x16\x03\x03\x00";
        let dtls: &[u8] = b"\x16\xfe\xfd\x00";
        let plain: &[u8] = b"GET / HTTP/1.1\r\n";

        let cases: Vec<(S, TransportProtocol, &[u8], Vec<LayerKind>)> = vec![
            (S::Http, T, plain, vec![http]),
            (S::Http, T, tls, vec![ClientTls, http]),
            (S::Https, T, plain, vec![ServerTls, http]),
            (S::Https, T, tls, vec![ServerTls, ClientTls, http]),
            (S::Https, U, plain, vec![ServerQuic, ClientQuic, http]),
            (S::Tcp, T, plain, vec![Tcp { ignore: false }]),
            (S::Tcp, T, tls, vec![ClientTls, Tcp { ignore: false }]),
            (S::Tls, T, plain, vec![ServerTls, Tcp { ignore: false }]),
            (S::Tls, T, tls, vec![ServerTls, ClientTls, Tcp { ignore: false }]),
            (S::Udp, U, plain, vec![Udp { ignore: false }]),
            (S::Udp, U, dtls, vec![ClientTls, Udp { ignore: false }]),
            (S::Dtls, U, plain, vec![ServerTls, Udp { ignore: false }]),
            (S::Dtls, U, dtls, vec![ServerTls, ClientTls, Udp { ignore: false }]),
            (S::Dns, U, plain, vec![Dns]),
            (S::Http3, U, plain, vec![ServerQuic, ClientQuic, http]),
            (S::Quic, U, plain, vec![ServerQuic, ClientQuic, RawQuic { force_raw: true }]),
        ];
        for (scheme, transport, data, expected) in cases {
            let t = reverse(scheme, transport);
            assert_eq!(decide_for(&t, data).unwrap(), expected, "{:?} {:?}", scheme, transport);
        }
    }

    #[test]
    fn test_reverse_host_filter_first() {
        let mut t = reverse(ReverseScheme::Https, TransportProtocol::Tcp);
        t.options_mut().ignore_hosts = HostPatterns::new(["backend"]).unwrap();
        t.conns[t.cx.server].address = Some(Address::domain("backend.internal", 8443));
        assert_eq!(decide_for(&t, NOT_CLIENT_HELLO).unwrap(), [LayerKind::Tcp { ignore: true }]);
    }
}
