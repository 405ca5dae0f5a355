use axum::http::{header, HeaderMap};
use std::net::IpAddr;
use xxhash_rust::xxh3::xxh3_64;

/// Placeholder for identity parts the request does not carry.
pub const UNKNOWN: &str = "unknown";

/// Resolve the client address used for visitor identity.
///
/// With `trust_proxy_headers`, the first `X-Forwarded-For` hop wins, then
/// `X-Real-IP`; otherwise only the socket peer address is used.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return Some(ip.to_string());
        }
    }

    peer.map(|ip| ip.to_string())
}

/// Compute the visitor id for an address and user agent.
///
/// Missing parts fall back to [`UNKNOWN`] so every request still maps to an
/// id; unidentifiable clients collapse into one visitor.
pub fn compute_visitor_id(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let ip = ip.filter(|s| !s.is_empty()).unwrap_or(UNKNOWN);
    let user_agent = user_agent
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN);

    let input = format!("{ip}|{user_agent}");
    let hash = xxh3_64(input.as_bytes());
    format!("{hash:016x}")
}

/// Derive the visitor id for an incoming request.
pub fn visitor_id_for_request(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> String {
    let ip = client_ip(headers, peer, trust_proxy_headers);
    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());

    if ip.is_none() || user_agent.is_none() {
        tracing::debug!(
            has_ip = ip.is_some(),
            has_user_agent = user_agent.is_some(),
            "incomplete visitor identity, using fallback"
        );
    }

    compute_visitor_id(ip.as_deref(), user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_visitor_id_deterministic() {
        let id1 = compute_visitor_id(Some("10.0.0.1"), Some("Mozilla/5.0"));
        let id2 = compute_visitor_id(Some("10.0.0.1"), Some("Mozilla/5.0"));
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 16);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_visitor_id_distinguishes_inputs() {
        let base = compute_visitor_id(Some("10.0.0.1"), Some("Mozilla/5.0"));
        assert_ne!(
            base,
            compute_visitor_id(Some("10.0.0.2"), Some("Mozilla/5.0"))
        );
        assert_ne!(base, compute_visitor_id(Some("10.0.0.1"), Some("curl/8.0")));
    }

    #[test]
    fn test_missing_parts_fall_back() {
        assert_eq!(
            compute_visitor_id(None, None),
            compute_visitor_id(Some(UNKNOWN), Some(UNKNOWN))
        );
        assert_eq!(
            compute_visitor_id(Some(""), Some("   ")),
            compute_visitor_id(None, None)
        );
    }

    #[test]
    fn test_client_ip_ignores_proxy_headers_by_default() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9")]);
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            client_ip(&h, Some(peer), false).as_deref(),
            Some("127.0.0.1")
        );
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "198.51.100.7"),
        ]);
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            client_ip(&h, Some(peer), true).as_deref(),
            Some("203.0.113.9")
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_peer() {
        let h = headers(&[
            ("x-forwarded-for", "garbage"),
            ("x-real-ip", "198.51.100.7"),
        ]);
        assert_eq!(client_ip(&h, None, true).as_deref(), Some("198.51.100.7"));
        assert_eq!(client_ip(&HeaderMap::new(), None, true), None);
    }

    #[test]
    fn test_visitor_id_for_request_uses_user_agent() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        let h = headers(&[("user-agent", "Mozilla/5.0")]);
        assert_eq!(
            visitor_id_for_request(&h, Some(peer), false),
            compute_visitor_id(Some("127.0.0.1"), Some("Mozilla/5.0"))
        );
    }
}
