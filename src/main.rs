//! Binary entry point: parse arguments, load configuration, serve.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::net::TcpListener;

use origin_proxy::config::{load_config, ProxyConfig};
use origin_proxy::http::server::shutdown_signal;
use origin_proxy::http::HttpServer;
use origin_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(
    name = "origin-proxy",
    about = "Transparent forwarding proxy for a single upstream origin",
    version
)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "ORIGIN_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.url,
        request_timeout_secs = config.timeouts.request_secs,
        tls_enabled = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let server = HttpServer::new(config.clone())?;

    if let Some(tls) = &config.listener.tls {
        let addr: SocketAddr = config.listener.bind_address.parse()?;
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;

        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(
                server
                    .router()
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        server.run(listener).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
