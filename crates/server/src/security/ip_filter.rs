use std::net::IpAddr;
use std::str::FromStr;

use crate::config::{IpNet, SecurityConfig};

/// A configured allow/deny pattern: an exact address string or a CIDR range.
#[derive(Clone, Debug)]
pub enum IpPattern {
    Exact(String),
    Cidr(IpNet),
}

impl IpPattern {
    pub fn matches(&self, ip: &str) -> bool {
        match self {
            IpPattern::Exact(pattern) => pattern == ip,
            IpPattern::Cidr(net) => match IpAddr::from_str(ip) {
                Ok(addr) => net.contains(&addr),
                Err(_) => false,
            },
        }
    }
}

impl FromStr for IpPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            Ok(IpPattern::Cidr(s.parse()?))
        } else {
            Ok(IpPattern::Exact(s.to_string()))
        }
    }
}

/// Whitelist/blacklist check over the client identifier.
///
/// Blacklist always takes precedence; a non-empty whitelist admits only
/// matching identifiers.
#[derive(Clone, Debug, Default)]
pub struct IpFilter {
    whitelist: Vec<IpPattern>,
    blacklist: Vec<IpPattern>,
}

impl IpFilter {
    pub fn new(whitelist: Vec<IpPattern>, blacklist: Vec<IpPattern>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    /// Build from configured pattern strings, dropping unparseable entries
    /// (config validation rejects them at startup already).
    pub fn from_config(config: &SecurityConfig) -> Self {
        let parse = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| p.parse::<IpPattern>().ok())
                .collect::<Vec<_>>()
        };
        Self::new(parse(&config.ip_whitelist), parse(&config.ip_blacklist))
    }

    /// Returns the denial reason when the identifier is not admitted.
    pub fn check(&self, ip: &str) -> Result<(), String> {
        if self.blacklist.iter().any(|p| p.matches(ip)) {
            return Err(format!("IP {ip} is blacklisted"));
        }

        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|p| p.matches(ip)) {
            return Err(format!("IP {ip} is not whitelisted"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<IpPattern> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn empty_filter_admits_everything() {
        let filter = IpFilter::default();
        assert!(filter.check("203.0.113.7").is_ok());
        assert!(filter.check("unknown").is_ok());
    }

    #[test]
    fn blacklist_exact_match_denies() {
        let filter = IpFilter::new(Vec::new(), patterns(&["203.0.113.7"]));
        assert!(filter.check("203.0.113.7").is_err());
        assert!(filter.check("203.0.113.8").is_ok());
    }

    #[test]
    fn blacklist_cidr_match_denies() {
        let filter = IpFilter::new(Vec::new(), patterns(&["10.0.0.0/8"]));
        assert!(filter.check("10.1.2.3").is_err());
        assert!(filter.check("11.1.2.3").is_ok());
    }

    #[test]
    fn whitelist_denies_non_members() {
        let filter = IpFilter::new(patterns(&["192.168.0.0/16"]), Vec::new());
        assert!(filter.check("192.168.4.2").is_ok());
        assert!(filter.check("203.0.113.7").is_err());
    }

    #[test]
    fn blacklist_beats_whitelist() {
        let filter = IpFilter::new(
            patterns(&["192.168.0.0/16"]),
            patterns(&["192.168.4.2"]),
        );
        assert!(filter.check("192.168.4.2").is_err());
        assert!(filter.check("192.168.4.3").is_ok());
    }

    #[test]
    fn unparseable_identifier_never_matches_cidr() {
        let filter = IpFilter::new(Vec::new(), patterns(&["10.0.0.0/8"]));
        assert!(filter.check("unknown").is_ok());
    }
}
