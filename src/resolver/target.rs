//! Connection target parsing.
//!
//! # Grammar
//! ```text
//! [scheme://][authority/]host[:port]
//! ```
//!
//! # Design Decisions
//! - Scheme defaults to `dns` when absent
//! - Bare IP literals (v4, or v6 without brackets) are accepted as-is
//! - A trailing separator with no port (`"[::1]:"`) is rejected
//! - An empty host (`":80"`) means the local system

use std::net::IpAddr;

use crate::error::ParseError;
use crate::resolver::address::{format_ip, join_host_port, Address};

/// Scheme used when the target string does not name one.
pub const DEFAULT_SCHEME: &str = "dns";

/// Host substituted when the target omits it.
const LOCALHOST: &str = "localhost";

/// A parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Resolver scheme, lowercased (e.g. `dns`, `passthrough`).
    pub scheme: String,
    /// Nameserver override as `host:port`, if the target carried an authority.
    pub authority: Option<String>,
    /// Everything after `scheme://authority/`, verbatim. Used as the cache key.
    pub endpoint: String,
    pub host: String,
    pub port: String,
}

impl Target {
    /// Parse a full target string.
    ///
    /// `default_port` applies to the endpoint; an authority without a port
    /// gets `dns_server_port`.
    pub fn parse(raw: &str, default_port: &str, dns_server_port: &str) -> Result<Self, ParseError> {
        let (scheme, authority, endpoint) = match split_scheme(raw) {
            Some((scheme, rest)) => match rest.split_once('/') {
                Some((authority, endpoint)) => (scheme, authority, endpoint),
                None => (scheme, "", rest),
            },
            None => (DEFAULT_SCHEME.to_string(), "", raw),
        };

        let authority = if authority.is_empty() {
            None
        } else {
            let (host, port) = parse_host_port(authority, dns_server_port)?;
            Some(join_host_port(&host, &port))
        };

        let (host, port) = parse_host_port(endpoint, default_port)?;

        Ok(Self {
            scheme,
            authority,
            endpoint: endpoint.to_string(),
            host,
            port,
        })
    }

    /// The single address of an IP-literal target, or `None` if the host needs resolution.
    pub fn literal_address(&self) -> Option<Address> {
        Address::from_ip(&self.host, &self.port)
    }
}

/// Split off `scheme://` if the prefix looks like a URI scheme.
fn split_scheme(raw: &str) -> Option<(String, &str)> {
    let (scheme, rest) = raw.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Some((scheme.to_ascii_lowercase(), rest))
    } else {
        None
    }
}

/// Parse a `host[:port]` string into host and port.
///
/// # Examples
/// ```text
/// "www.google.com", "443" -> ("www.google.com", "443")
/// "ipv4-host:80",   "443" -> ("ipv4-host", "80")
/// "[ipv6-host]",    "443" -> ("ipv6-host", "443")
/// ":80",            "443" -> ("localhost", "80")
/// ```
pub fn parse_host_port(target: &str, default_port: &str) -> Result<(String, String), ParseError> {
    if target.is_empty() {
        return Err(ParseError::MissingTarget);
    }
    if target.parse::<IpAddr>().is_ok() {
        return Ok((target.to_string(), default_port.to_string()));
    }

    if let Ok((host, port)) = split_host_port(target) {
        if port.is_empty() {
            return Err(ParseError::TrailingSeparator);
        }
        let host = if host.is_empty() { LOCALHOST.to_string() } else { host };
        return Ok((host, port));
    }

    match split_host_port(&format!("{}:{}", target, default_port)) {
        Ok(parts) => Ok(parts),
        Err(cause) => Err(ParseError::InvalidTarget {
            target: target.to_string(),
            cause,
        }),
    }
}

/// Split `host:port`, `[ipv6]:port` or `:port`. The port may be empty.
fn split_host_port(hostport: &str) -> Result<(String, String), String> {
    let colon = hostport
        .rfind(':')
        .ok_or_else(|| format!("address {}: missing port in address", hostport))?;

    let (host, open_search_from, close_search_from) = if hostport.starts_with('[') {
        let end = hostport
            .find(']')
            .ok_or_else(|| format!("address {}: missing ']' in address", hostport))?;
        if end + 1 == hostport.len() {
            return Err(format!("address {}: missing port in address", hostport));
        }
        if end + 1 != colon {
            return Err(if hostport.as_bytes()[end + 1] == b':' {
                format!("address {}: too many colons in address", hostport)
            } else {
                format!("address {}: missing port in address", hostport)
            });
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return Err(format!("address {}: too many colons in address", hostport));
        }
        (host, 0, 0)
    };

    if hostport[open_search_from..].contains('[') {
        return Err(format!("address {}: unexpected '[' in address", hostport));
    }
    if hostport[close_search_from..].contains(']') {
        return Err(format!("address {}: unexpected ']' in address", hostport));
    }

    Ok((host.to_string(), hostport[colon + 1..].to_string()))
}
