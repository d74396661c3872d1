//! Error types for the DNS server.
//!
//! Every failure is scoped to the datagram or the lookup that produced it;
//! none of these is fatal to the process.

use thiserror::Error;

/// Represents errors that can occur in the DNS server.
#[derive(Error, Debug)]
pub enum DnsError {
    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Truncated header or question, a count that runs past the buffer,
    /// or a compression pointer chain that exceeds the hop bound.
    #[error("Malformed DNS message: {0}")]
    MalformedMessage(String),

    /// Upstream lookup failed. Recovered inside the resolver.
    #[error("Resolution failure: {0}")]
    ResolutionFailure(String),

    /// A computed buffer size disagrees with what was written.
    #[error("Encoding overflow: {0}")]
    EncodingOverflow(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DnsError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DnsError::MalformedMessage(msg.into())
    }
}
