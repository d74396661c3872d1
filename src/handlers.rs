//! Request handlers for the DNS server.
//!
//! This module provides the UDP receive loop and the per-datagram pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error, info, warn};
use metrics::increment_counter;
use tokio::{net::UdpSocket, task};

use crate::config::ServerConfig;
use crate::dns::{build_response, decode};
use crate::errors::DnsError;
use crate::resolver::{build_resolver, NameResolver};

/// Run the UDP DNS server.
///
/// # Arguments
/// * `config` - The server configuration.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn run_udp_server(config: ServerConfig) -> Result<(), DnsError> {
    let socket = UdpSocket::bind(config.bind_addr).await?;
    info!("UDP DNS server listening on {}", socket.local_addr()?);
    match config.resolver {
        Some(upstream) => info!("Forwarding A lookups to {}", upstream),
        None => info!("No resolver configured, answering every name with the fallback address"),
    }

    serve(Arc::new(socket), build_resolver(&config), config.max_packet_size).await
}

/// Receive datagrams on `socket` forever, one task per datagram.
pub async fn serve(
    socket: Arc<UdpSocket>,
    resolver: Arc<dyn NameResolver>,
    max_packet_size: usize,
) -> Result<(), DnsError> {
    let mut buf = vec![0u8; max_packet_size];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((amt, src)) => {
                let query = buf[..amt].to_vec();
                let socket = socket.clone();
                let resolver = resolver.clone();
                task::spawn(async move {
                    if let Err(e) = handle_udp_query(query, src, socket, resolver).await {
                        warn!("Dropping query from {}: {}", src, e);
                    }
                });
            }
            Err(e) => error!("UDP receive error: {}", e),
        }
    }
}

/// Handle a UDP DNS query.
///
/// # Arguments
/// * `query` - The DNS query.
/// * `src` - The source address of the query.
/// * `socket` - The UDP socket to send the response on.
/// * `resolver` - Resolver for the questions.
///
/// # Returns
/// A `Result` indicating success or failure.
pub async fn handle_udp_query(
    query: Vec<u8>,
    src: SocketAddr,
    socket: Arc<UdpSocket>,
    resolver: Arc<dyn NameResolver>,
) -> Result<(), DnsError> {
    increment_counter!("dns_queries_total");
    debug!("Query from {} ({} bytes)", src, query.len());
    let response = answer_query(&query, resolver.as_ref()).await.map_err(|e| {
        if matches!(e, DnsError::MalformedMessage(_)) {
            increment_counter!("dns_malformed_total");
        }
        e
    })?;

    socket.send_to(&response, src).await?;
    Ok(())
}

/// Decode `query`, resolve its questions and encode the reply.
///
/// All lookups run at once. Answers keep question order.
pub async fn answer_query(query: &[u8], resolver: &dyn NameResolver) -> Result<Vec<u8>, DnsError> {
    let decoded = decode(query)?;

    let lookups = decoded.questions.iter().map(|question| {
        debug!("Question for {} (type {})", question.name(), question.qtype);
        resolver.resolve(question)
    });
    let addrs = join_all(lookups).await;

    build_response(&decoded, &addrs)
}
