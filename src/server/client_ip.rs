//! Resolve the client address used as the rate limiter key.
//!
//! Proxy headers are consulted in order: `Forwarded` (`for=`), the first
//! entry of `X-Forwarded-For`, then `X-Real-IP`.  Without any of them
//! the peer socket address is used.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const UNKNOWN: &str = "unknown";

pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    forwarded_for(headers)
        .or_else(|| first_header_value(headers, "x-forwarded-for"))
        .or_else(|| first_header_value(headers, "x-real-ip"))
        .map(|addr| strip_port(&addr))
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// First `for=` value of the RFC 7239 `Forwarded` header.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("forwarded")?.to_str().ok()?;
    let first_hop = raw.split(',').next()?;

    first_hop.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("for") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(name)?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// `1.2.3.4:5678` -> `1.2.3.4`, `[::1]:80` -> `::1`; bare addresses
/// pass through.
fn strip_port(addr: &str) -> String {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((ip, _)) = rest.split_once(']') {
            return ip.to_string();
        }
    }
    match addr.split_once(':') {
        Some((ip, port)) if !port.contains(':') => ip.to_string(),
        _ => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn forwarded_header_wins() {
        let h = headers(&[
            ("forwarded", "for=192.0.2.60;proto=http;by=203.0.113.43, for=198.51.100.17"),
            ("x-forwarded-for", "10.0.0.1"),
        ]);
        assert_eq!(client_key(&h, None), "192.0.2.60");
    }

    #[test]
    fn forwarded_ipv6_with_port() {
        let h = headers(&[("forwarded", "For=\"[2001:db8:cafe::17]:4711\"")]);
        assert_eq!(client_key(&h, None), "2001:db8:cafe::17");
    }

    #[test]
    fn x_forwarded_for_first_entry() {
        let h = headers(&[("x-forwarded-for", "203.0.113.195, 70.41.3.18, 150.172.238.178")]);
        assert_eq!(client_key(&h, None), "203.0.113.195");
    }

    #[test]
    fn x_real_ip_then_peer() {
        let h = headers(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(client_key(&h, None), "198.51.100.7");

        let peer: SocketAddr = "127.0.0.1:52000".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "127.0.0.1");
    }

    #[test]
    fn nothing_known() {
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn port_stripping() {
        assert_eq!(strip_port("1.2.3.4:5678"), "1.2.3.4");
        assert_eq!(strip_port("1.2.3.4"), "1.2.3.4");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("[::1]:80"), "::1");
    }
}
