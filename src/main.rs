//! DNS fallback server
//!
//! Answers A queries over UDP, resolving each name through an optional
//! upstream resolver and falling back to a fixed address.

use log::info;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;

use dns_fallback_server::{config::ServerConfig, errors::DnsError, handlers::run_udp_server};

#[tokio::main]
async fn main() -> Result<(), DnsError> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let config = ServerConfig::from_args()?;

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| DnsError::Config(format!("metrics exporter: {}", e)))?;
        info!("Serving metrics on {}", addr);
    }

    let shutdown_signal = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    };

    tokio::select! {
        _ = shutdown_signal => {
            info!("Initiating graceful shutdown...");
            Ok(())
        },
        res = run_udp_server(config) => res,
    }
}
