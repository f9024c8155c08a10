use anyhow::{bail, Context, Result};
use axum::serve;
use ghostseed::core::config::Config;
use ghostseed::core::state::AppState;
use ghostseed::core::{routes, tracing_init};
use ghostseed::probe;
use ghostseed::session::identity::ProcessSession;
use ghostseed::torrent::rewrite::rewrite_directory;
use ghostseed::upstream::fetcher::BootstrapFetcher;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    // Standalone subcommand: ghostseed probe <host> <port> <infohash-hex>
    if args.len() > 1 && args[1] == "probe" {
        return run_probe(&args[2..]);
    }

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // A missing config file is fine; built-in defaults match the common
    // single-machine setup. A present-but-invalid file is an error.
    let config = Config::load_or_default(&config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;

    tracing_init::init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        port = config.server.port,
        num_threads = config.server.num_threads,
        torrent_dir = %config.proxy.torrent_dir.display(),
        log_level = %config.logging.level,
        "Announce proxy starting"
    );

    // Rewrite pass first, so freshly dropped torrents are ready before
    // the announce endpoint comes up.
    let summary = rewrite_directory(&config.proxy.torrent_dir, &config.proxy.public_url)
        .context(format!(
            "Failed to scan torrent directory '{}'",
            config.proxy.torrent_dir.display()
        ))?;

    info!(
        rewritten = summary.processed.len(),
        skipped = summary.skipped,
        failed = summary.failed,
        "Torrent rewrite pass completed"
    );

    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            "Some torrent files could not be rewritten; they will be retried on next start"
        );
    }

    let identity = ProcessSession::generate(config.client.port);
    info!(peer_id = %identity.peer_id, key = %identity.key, "Generated session identity");

    let fetcher = BootstrapFetcher::new(&config)?;
    let state = AppState::new(config.clone(), fetcher, identity);

    let app = routes::build_router(Arc::new(state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind TCP listener to {}", addr))?;

    info!(address = %addr, "Announce endpoint listening");

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutting down gracefully");

    Ok(())
}

/// One-shot reachability check against a peer, bypassing the proxy
fn run_probe(args: &[String]) -> Result<()> {
    if args.len() != 3 {
        bail!("usage: ghostseed probe <host> <port> <infohash-hex>");
    }

    let host = &args[0];
    let port: u16 = args[1]
        .parse()
        .context(format!("Invalid port '{}'", args[1]))?;

    let decoded = hex::decode(&args[2]).context("Infohash must be 40 hex characters")?;
    let info_hash: [u8; 20] = decoded
        .try_into()
        .map_err(|_| anyhow::anyhow!("Infohash must be exactly 20 bytes"))?;

    let identity = ProcessSession::generate(0);
    let mut peer_id = [0u8; 20];
    peer_id.copy_from_slice(identity.peer_id.as_bytes());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let outcome = runtime.block_on(probe::probe(
        host,
        port,
        info_hash,
        peer_id,
        Duration::from_secs(10),
    ));

    println!("{outcome}");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
