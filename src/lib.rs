//! DNS Fallback Server Library
//!
//! This library decodes DNS query datagrams, resolves each question to an
//! IPv4 address and encodes the A-record reply.

pub mod config;
pub mod dns;
pub mod errors;
pub mod handlers;
pub mod resolver;
pub mod utils;

// Re-export commonly used items
pub use config::ServerConfig;
pub use errors::DnsError;
pub use resolver::{FallbackResolver, NameResolver, UpstreamResolver};
