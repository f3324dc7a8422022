//! Resonance Server - standalone headless Slimproto/LMS-compatible music server.
//!
//! This binary wires `resonance-core`'s bootstrapped services to a listening
//! process: it owns CLI parsing, logging configuration, and the HTTP/Slimproto
//! accept loops' lifetime.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use resonance_core::{web, EmptyLibrary};
use tokio::signal;

use crate::config::ServerConfig;

/// Resonance Server - headless Slimproto/LMS-compatible music server.
#[derive(Parser, Debug)]
#[command(name = "resonance-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host/interface to bind to.
    #[arg(long, env = "RESONANCE_HOST")]
    host: Option<String>,

    /// Slimproto TCP port.
    #[arg(short = 'p', long, env = "RESONANCE_SLIMPROTO_PORT")]
    port: Option<u16>,

    /// HTTP (stream/JSON-RPC/CometD) port.
    #[arg(long, env = "RESONANCE_WEB_PORT")]
    web_port: Option<u16>,

    /// Data directory for persistent state.
    #[arg(short = 'd', long, env = "RESONANCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging. Repeat for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("[Server] startup failed: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new().filter_level(args.log_level()).format_timestamp_millis().init();

    log::info!("Resonance Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.slimproto_port = port;
    }
    if let Some(web_port) = args.web_port {
        config.web_port = web_port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!("Configuration: host={}, slimproto_port={}, web_port={}", config.host, config.slimproto_port, config.web_port);

    let core_config = config.to_core_config();
    let mut services = resonance_core::bootstrap_services(&core_config, Arc::new(EmptyLibrary)).await.context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let web_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let listener = tokio::net::TcpListener::bind(&web_addr).await.with_context(|| format!("Failed to bind HTTP listener on {web_addr}"))?;
    let bound_port = listener.local_addr().context("Failed to read bound HTTP port")?.port();

    services.spawn_slimproto();
    services.spawn_discovery(bound_port);

    let app_state = web::AppState {
        registry: services.registry.clone(),
        playlists: services.playlists.clone(),
        library: services.library.clone(),
        streaming: services.streaming.clone(),
        seek: services.seek.clone(),
        seek_executor: services.seek_executor.clone(),
        device_config: services.device_config.clone(),
        transcode_policy: services.transcode_policy.clone(),
        transcode_config: services.transcode_config.clone(),
        third_party_bin_dir: core_config.streaming.third_party_bin_dir.clone(),
        cometd: services.cometd.clone(),
        jsonrpc: services.jsonrpc.clone(),
        cometd_connect_timeout_secs: core_config.cometd_connect_timeout_secs,
        server_host: services.network.get_local_ip(),
        server_port: bound_port,
        server_uuid: services.server_uuid.clone(),
    };

    log::info!("Server listening on http://0.0.0.0:{bound_port}");
    let app = web::create_router(app_state);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
            log::error!("[Server] HTTP server error: {e}");
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("Failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
