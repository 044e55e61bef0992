//! Resolution backends.
//!
//! # Responsibilities
//! - Define the interface a resolver uses to turn a hostname into IPs
//! - Provide the system resolver backed by the OS (`getaddrinfo` via tokio)

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LookupError;

/// A DNS SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Interface that acquires the addresses behind a hostname.
#[async_trait]
pub trait LookupBackend: Send + Sync {
    /// Return the textual IP addresses of `host`.
    ///
    /// Entries that are not valid IPs are tolerated; the resolver drops them.
    async fn lookup_host(&self, host: &str) -> Result<Vec<String>, LookupError>;

    /// SRV records for `_service._proto.name`. Not used by the core resolver.
    async fn lookup_srv(&self, _service: &str, _proto: &str, _name: &str) -> Result<Vec<SrvRecord>, LookupError> {
        Ok(Vec::new())
    }

    /// TXT records for `name`. Not used by the core resolver.
    async fn lookup_txt(&self, _name: &str) -> Result<Vec<String>, LookupError> {
        Ok(Vec::new())
    }
}

/// Builds a backend that queries a specific nameserver (`host:port`).
pub type AuthorityLookup = Arc<dyn Fn(&str) -> Arc<dyn LookupBackend> + Send + Sync>;

/// Backend using the operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

impl SystemLookup {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LookupBackend for SystemLookup {
    async fn lookup_host(&self, host: &str) -> Result<Vec<String>, LookupError> {
        let resolved = tokio::net::lookup_host((host, 0)).await?;

        let mut ips: Vec<String> = Vec::new();
        for addr in resolved {
            let ip = addr.ip().to_string();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
        Ok(ips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_lookup_localhost() {
        let ips = SystemLookup::new().lookup_host("localhost").await.unwrap();
        assert!(!ips.is_empty());
        for ip in ips {
            assert!(ip.parse::<std::net::IpAddr>().is_ok());
        }
    }

    #[tokio::test]
    async fn test_extended_records_default_to_empty() {
        let backend = SystemLookup::new();
        assert!(backend.lookup_srv("grpclb", "tcp", "svc").await.unwrap().is_empty());
        assert!(backend.lookup_txt("_grpc_config.svc").await.unwrap().is_empty());
    }
}
