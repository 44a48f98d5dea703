use clap::Parser;
use monitor::HttpIndexerClient;
use notify_fetcher::{Fetcher, FetcherConfig};
use notify_pubsub::{Publisher, RedisPublisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monitor", about = "Polls an indexer for new blocks and publishes them to the broker")]
struct Args {
    /// Path to the monitor's YAML config file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match notify_config::load_monitor_config(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let publisher = match RedisPublisher::connect(
        &config.redis_host,
        &config.redis_password,
        &config.new_block_channel,
    )
    .await
    {
        Ok(p) => Arc::new(p),
        Err(err) => {
            error!(error = %err, "failed to connect publisher to broker");
            std::process::exit(1);
        }
    };

    let metrics_listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.metrics_port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, port = config.metrics_port, "failed to bind metrics listener");
            std::process::exit(1);
        }
    };
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, monitor::metrics::router()).await {
            error!(error = %err, "metrics server error");
        }
    });

    // The fetcher's on_block callback is synchronous; publishing is async,
    // so blocks are handed off to a FIFO drained by a task that awaits
    // `publish` one block at a time, preserving fetch order end to end.
    let (block_tx, mut block_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let publish_timeout = Duration::from_millis(config.publisher_timeout_ms);
    let publish_task_publisher = publisher.clone();
    tokio::spawn(async move {
        while let Some(block_bytes) = block_rx.recv().await {
            if let Err(err) = publish_task_publisher.publish(block_bytes, publish_timeout).await {
                error!(error = %err, "monitor: failed to publish block, continuing with next block");
            }
        }
    });

    let indexer = Arc::new(HttpIndexerClient::new(
        config.indexer_host.clone(),
        config.indexer_api_token.clone(),
    ));

    let fetcher = match Fetcher::start(
        indexer,
        FetcherConfig {
            rps: config.fetcher_rps,
            start_round: config.start_round,
        },
        move |block| {
            let _ = block_tx.send(block);
        },
    )
    .await
    {
        Ok(f) => f,
        Err(err) => {
            error!(error = %err, "failed to start fetcher");
            std::process::exit(1);
        }
    };

    info!(
        host = %config.indexer_host,
        rps = config.fetcher_rps,
        metrics_port = config.metrics_port,
        "monitor running"
    );

    shutdown_signal().await;
    fetcher.stop();
    info!("monitor shut down gracefully");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        () = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
