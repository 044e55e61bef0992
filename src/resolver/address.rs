//! Resolved network addresses.

use std::fmt;
use std::net::IpAddr;
use serde::Serialize;

/// A resolved `ip:port` address.
///
/// IPv6 hosts are always bracketed, so two addresses are equal exactly when
/// their normalized strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Build an address from a textual IP and a port.
    ///
    /// Returns `None` if `ip` is not a valid IP literal.
    pub fn from_ip(ip: &str, port: &str) -> Option<Self> {
        format_ip(ip).map(|host| Self(format!("{}:{}", host, port)))
    }

    /// Wrap an endpoint string verbatim (passthrough resolution).
    pub fn verbatim(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a textual IP for use as a host.
///
/// IPv4 is returned unchanged, IPv6 is enclosed in square brackets, anything
/// else yields `None`.
pub fn format_ip(addr: &str) -> Option<String> {
    match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(_) => Some(addr.to_string()),
        IpAddr::V6(_) => Some(format!("[{}]", addr)),
    }
}

/// Join host and port, bracketing hosts that contain a colon.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
