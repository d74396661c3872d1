//! Name resolution for answered questions.
//!
//! A resolver turns a question into an IPv4 address. Resolution never fails
//! from the caller's point of view: every lookup error collapses to
//! [`FALLBACK_ADDR`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use metrics::{histogram, increment_counter};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::dns::{build_a_query, first_a_record, Question};
use crate::errors::DnsError;

/// Address returned when no upstream is configured or a lookup fails.
pub const FALLBACK_ADDR: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

/// Largest upstream reply we read.
const MAX_UPSTREAM_REPLY: usize = 4096;

/// Chosen once at startup and shared read-only by every datagram.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve the question's name to an address.
    async fn resolve(&self, question: &Question) -> Ipv4Addr;
}

/// Answers every question with [`FALLBACK_ADDR`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResolver;

#[async_trait]
impl NameResolver for FallbackResolver {
    async fn resolve(&self, _question: &Question) -> Ipv4Addr {
        FALLBACK_ADDR
    }
}

/// Delegates A lookups to a single upstream resolver over UDP.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    upstream: SocketAddr,
    timeout: Duration,
}

impl UpstreamResolver {
    pub fn new(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Perform one A lookup without the timeout or fallback applied.
    pub async fn lookup(&self, question: &Question) -> Result<Ipv4Addr, DnsError> {
        let id = fastrand::u16(..);
        let query = build_a_query(id, &question.labels)?;
        let reply = forward_request_udp(self.upstream, &query).await?;
        first_a_record(&reply, id)
    }
}

#[async_trait]
impl NameResolver for UpstreamResolver {
    async fn resolve(&self, question: &Question) -> Ipv4Addr {
        let name = question.name();
        let started = Instant::now();
        let result = timeout(self.timeout, self.lookup(question)).await;
        histogram!("dns_upstream_lookup_seconds", started.elapsed().as_secs_f64());

        let err = match result {
            Ok(Ok(addr)) => {
                debug!("Resolved {} to {} via {}", name, addr, self.upstream);
                return addr;
            }
            Ok(Err(e)) => e,
            Err(_) => DnsError::ResolutionFailure(format!(
                "no reply from {} within {:?}",
                self.upstream, self.timeout
            )),
        };

        increment_counter!("dns_resolution_fallbacks_total");
        warn!(
            "Failed to resolve {}, returning fallback address {}: {}",
            name, FALLBACK_ADDR, err
        );
        FALLBACK_ADDR
    }
}

/// Send a query to `upstream` over UDP and wait for one reply.
///
/// Datagrams from any other source are ignored.
///
/// # Arguments
/// * `upstream` - The upstream resolver.
/// * `query` - The encoded DNS query.
///
/// # Returns
/// A `Result` containing the raw reply or an error.
pub async fn forward_request_udp(upstream: SocketAddr, query: &[u8]) -> Result<Vec<u8>, DnsError> {
    let local = if upstream.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };

    let socket = UdpSocket::bind(local).await?;
    socket.send_to(query, upstream).await?;

    let mut buf = vec![0u8; MAX_UPSTREAM_REPLY];
    loop {
        let (size, src) = socket.recv_from(&mut buf).await?;
        if src == upstream {
            buf.truncate(size);
            return Ok(buf);
        }
        debug!("Ignoring datagram from {} while waiting on {}", src, upstream);
    }
}

/// Pick the resolver implementation for the configuration.
pub fn build_resolver(config: &ServerConfig) -> Arc<dyn NameResolver> {
    match config.resolver {
        Some(upstream) => Arc::new(UpstreamResolver::new(upstream, config.upstream_timeout())),
        None => Arc::new(FallbackResolver),
    }
}
