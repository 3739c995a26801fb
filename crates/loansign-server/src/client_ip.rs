//! Client address extraction.
//!
//! The address stamped onto signed documents and written to the audit log.
//! With `trust_proxy` set, the first `X-Forwarded-For` hop wins; otherwise
//! the socket peer address is used. When neither is available (for example
//! a router driven directly in tests) the address is `unknown`.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::state::AppState;

const UNKNOWN: &str = "unknown";

/// The requesting client's IP address, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(resolve(&parts.headers, peer, state.trust_proxy)))
    }
}

fn resolve(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_for(headers) {
            return ip.to_string();
        }
    }
    peer.map_or_else(|| UNKNOWN.to_owned(), |ip| ip.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(xff: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("x-forwarded-for", HeaderValue::from_str(xff).unwrap());
        map
    }

    #[test]
    fn peer_address_by_default() {
        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(resolve(&headers("203.0.113.9"), Some(peer), false), "10.1.2.3");
    }

    #[test]
    fn first_forwarded_hop_when_trusted() {
        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(
            resolve(&headers("203.0.113.9, 10.0.0.1"), Some(peer), true),
            "203.0.113.9"
        );
    }

    #[test]
    fn garbage_forwarded_header_falls_back() {
        let peer: IpAddr = "::1".parse().unwrap();
        assert_eq!(resolve(&headers("not-an-ip"), Some(peer), true), "::1");
        assert_eq!(resolve(&HeaderMap::new(), None, true), UNKNOWN);
    }
}
