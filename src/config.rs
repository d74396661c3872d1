//! Configuration for the DNS server.
//!
//! This module defines the configuration structure, loaded from command line
//! flags with environment variable fallbacks.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::errors::DnsError;

/// Default address to bind the UDP socket to.
pub const DEFAULT_BIND: &str = "127.0.0.1:2053";

/// Default upstream lookup timeout in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 2000;

/// Maximum size of DNS packets in bytes.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Smallest receive buffer a UDP DNS server may use.
pub const MIN_PACKET_SIZE: usize = 512;

/// Standard DNS port, assumed when the resolver address has none.
pub const DNS_PORT: u16 = 53;

/// Server configuration, fixed at startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "dns-fallback-server", version, about = "Answers A queries over UDP")]
pub struct ServerConfig {
    /// Address to bind the DNS server to.
    #[arg(long = "bind", env = "DNS_BIND", default_value = DEFAULT_BIND)]
    pub bind_addr: SocketAddr,

    /// Upstream resolver (ip or ip:port). Without it every name resolves to 1.1.1.1.
    #[arg(long, env = "DNS_RESOLVER", value_parser = parse_resolver)]
    pub resolver: Option<SocketAddr>,

    /// How long to wait for the upstream resolver, in milliseconds.
    #[arg(long, env = "DNS_UPSTREAM_TIMEOUT_MS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS)]
    pub upstream_timeout_ms: u64,

    /// Maximum size of received DNS packets.
    #[arg(long, env = "DNS_MAX_PACKET_SIZE", default_value_t = MAX_PACKET_SIZE)]
    pub max_packet_size: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "DNS_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load server configuration from the process arguments and environment.
    ///
    /// # Returns
    /// A `Result` containing either the loaded `ServerConfig` or a `DnsError`.
    pub fn from_args() -> Result<Self, DnsError> {
        let config = Self::try_parse().map_err(|e| DnsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.upstream_timeout_ms == 0 {
            return Err(DnsError::Config("upstream timeout must be positive".into()));
        }
        if self.max_packet_size < MIN_PACKET_SIZE {
            return Err(DnsError::Config(format!(
                "max packet size {} is below {}",
                self.max_packet_size, MIN_PACKET_SIZE
            )));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

fn parse_resolver(s: &str) -> Result<SocketAddr, String> {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| format!("invalid resolver address: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, clap::Error> {
        ServerConfig::try_parse_from(std::iter::once("dns-fallback-server").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND.parse().unwrap());
        assert!(config.resolver.is_none());
        assert_eq!(config.upstream_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_packet_size, MAX_PACKET_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolver_with_port() {
        let config = parse(&["--resolver", "8.8.8.8:5353"]).unwrap();
        assert_eq!(config.resolver, Some("8.8.8.8:5353".parse().unwrap()));
    }

    #[test]
    fn test_resolver_without_port() {
        let config = parse(&["--resolver", "9.9.9.9"]).unwrap();
        assert_eq!(config.resolver, Some("9.9.9.9:53".parse().unwrap()));
    }

    #[test]
    fn test_invalid_resolver() {
        assert!(parse(&["--resolver", "not-an-address"]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = parse(&["--upstream-timeout-ms", "0"]).unwrap();
        assert!(matches!(config.validate(), Err(DnsError::Config(_))));

        let config = parse(&["--max-packet-size", "100"]).unwrap();
        assert!(matches!(config.validate(), Err(DnsError::Config(_))));
    }
}
