//! Derives the quota identity of an incoming request.
//!
//! The socket peer is the only address the server can vouch for. Forwarding
//! headers are honoured only when that peer is a configured trusted proxy.

use std::net::IpAddr;

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use ipnet::IpNet;
use moodcap_core::AppResult;
use moodcap_domain::IdentityKey;

/// Header carrying the user id authenticated by the fronting gateway.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Caller details resolved from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub identity: IdentityKey,
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
}

pub fn resolve_client_identity(
    peer: IpAddr,
    headers: &HeaderMap,
    trusted_proxies: &[IpNet],
) -> AppResult<ClientIdentity> {
    let peer = canonical(peer);
    let peer_is_trusted = is_trusted(peer, trusted_proxies);
    let ip_address = if peer_is_trusted {
        forwarded_client_ip(peer, headers, trusted_proxies)
    } else {
        peer
    };

    let authenticated_user = peer_is_trusted
        .then(|| header_value(headers, AUTHENTICATED_USER_HEADER))
        .flatten();
    let identity = match authenticated_user {
        Some(user_id) => IdentityKey::user(user_id.as_str())?,
        None => IdentityKey::ip(ip_address.to_string().as_str())?,
    };

    Ok(ClientIdentity {
        identity,
        ip_address,
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned),
    })
}

fn is_trusted(address: IpAddr, trusted_proxies: &[IpNet]) -> bool {
    trusted_proxies.iter().any(|net| net.contains(&address))
}

/// Walks the forwarding chain from the nearest hop outwards and returns the
/// first address that is not a trusted proxy.
fn forwarded_client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpNet]) -> IpAddr {
    let hops: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    let mut client = peer;
    for hop in hops.iter().rev() {
        let Ok(address) = hop.parse::<IpAddr>() else {
            break;
        };
        client = canonical(address);
        if !is_trusted(client, trusted_proxies) {
            break;
        }
    }

    client
}

fn canonical(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
