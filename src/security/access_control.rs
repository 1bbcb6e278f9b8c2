//! Client network allow-list for the status endpoint.
//!
//! # Responsibilities
//! - Parse a comma-separated list of networks (CIDR or bare addresses)
//! - Decide whether a client address may see the status endpoint
//!
//! # Design Decisions
//! - Host bits in a network are ignored (`10.0.0.1/8` means `10.0.0.0/8`)
//! - IPv4-mapped IPv6 clients are checked as IPv4
//! - An operator list with no usable entry falls back to allow-all, with a warning

use std::net::IpAddr;

use ipnet::IpNet;

#[derive(Debug, thiserror::Error)]
pub enum AccessListError {
    #[error("invalid network {entry:?}")]
    InvalidNetwork { entry: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessList {
    networks: Vec<IpNet>,
}

impl AccessList {
    /// `0.0.0.0/0` and `::/0`.
    pub fn allow_all() -> Self {
        Self {
            networks: vec![IpNet::V4(Default::default()), IpNet::V6(Default::default())],
        }
    }

    /// Strict parse; the first bad entry is an error.
    pub fn parse(spec: &str) -> Result<Self, AccessListError> {
        let networks = entries(spec)
            .map(parse_network)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// Lenient parse for startup: bad entries are logged and skipped.
    pub fn from_config(spec: &str) -> Self {
        let mut networks = Vec::new();
        for entry in entries(spec) {
            match parse_network(entry) {
                Ok(net) => networks.push(net),
                Err(e) => tracing::error!(error = %e, "Invalid network in HEALTHCHECK_ALLOWED"),
            }
        }

        if networks.is_empty() {
            tracing::warn!("No valid networks in HEALTHCHECK_ALLOWED, defaulting to allow all");
            return Self::allow_all();
        }
        Self { networks }
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|net| net.contains(&ip))
    }

    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }
}

impl Default for AccessList {
    fn default() -> Self {
        Self::allow_all()
    }
}

fn entries(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_network(entry: &str) -> Result<IpNet, AccessListError> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| AccessListError::InvalidNetwork {
            entry: entry.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_allows_everyone() {
        let list = AccessList::from_config("0.0.0.0/0,::/0");
        assert!(list.allows(ip("203.0.113.9")));
        assert!(list.allows(ip("2001:db8::1")));
        assert_eq!(list, AccessList::allow_all());
    }

    #[test]
    fn test_restricted_list() {
        let list = AccessList::parse("10.0.0.0/8, 192.168.1.5").unwrap();
        assert!(list.allows(ip("10.20.30.40")));
        assert!(list.allows(ip("192.168.1.5")));
        assert!(!list.allows(ip("192.168.1.6")));
        assert!(!list.allows(ip("::1")));
    }

    #[test]
    fn test_host_bits_ignored() {
        let list = AccessList::parse("10.1.2.3/8").unwrap();
        assert_eq!(list.networks()[0].to_string(), "10.0.0.0/8");
        assert!(list.allows(ip("10.200.0.1")));
    }

    #[test]
    fn test_mapped_ipv6_client() {
        let list = AccessList::parse("127.0.0.0/8").unwrap();
        assert!(list.allows(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn test_strict_parse_rejects_garbage() {
        assert!(matches!(
            AccessList::parse("10.0.0.0/8,nonsense"),
            Err(AccessListError::InvalidNetwork { entry }) if entry == "nonsense"
        ));
    }

    #[test]
    fn test_lenient_parse() {
        let list = AccessList::from_config("bogus, 172.16.0.0/12");
        assert_eq!(list.networks().len(), 1);
        assert!(list.allows(ip("172.16.5.5")));

        assert_eq!(AccessList::from_config("bogus,,"), AccessList::allow_all());
        assert_eq!(AccessList::from_config(""), AccessList::allow_all());
    }
}
