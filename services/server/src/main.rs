use clap::Parser;
use notify_hub::{ClientConfig, ClientFactory, Hub};
use notify_pubsub::{RedisSubscriber, Subscriber};
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Gorilla-websocket-style defaults: the ping interval must stay well
/// under the pong timeout so a missed ping or two doesn't immediately
/// read as a dead connection.
const WRITE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const PONG_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(54);
const MAX_READ_MESSAGE_SIZE: usize = 512 * 1024;
const SEND_BUFFER_SIZE: usize = 256;
const HUB_WORKER_POOL_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "server", about = "Websocket fan-out server for blockchain notification events")]
struct Args {
    /// Path to the server's YAML config file.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match notify_config::load_server_config(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let hub = match Hub::new(HUB_WORKER_POOL_SIZE) {
        Ok(hub) => hub,
        Err(err) => {
            error!(error = %err, "failed to construct hub");
            std::process::exit(1);
        }
    };

    let client_factory = match ClientFactory::new(ClientConfig {
        write_wait_timeout: WRITE_WAIT_TIMEOUT,
        pong_wait_timeout: PONG_WAIT_TIMEOUT,
        ping_interval: PING_INTERVAL,
        max_read_message_size: MAX_READ_MESSAGE_SIZE,
        send_buffer_size: SEND_BUFFER_SIZE,
    }) {
        Ok(factory) => Arc::new(factory),
        Err(err) => {
            error!(error = %err, "failed to construct client factory");
            std::process::exit(1);
        }
    };

    let state = AppState {
        hub: hub.clone(),
        client_factory,
    };

    // Decoded events must reach the hub's event channel in the same order
    // the broker delivered the raw block messages: one background task
    // drains a FIFO fed by the subscriber's (synchronous) callback and
    // awaits `send_event` sequentially, the same FIFO-then-await shape the
    // fetcher uses to go from its queue to `on_block`.
    let (block_tx, mut block_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let event_hub = hub.clone();
    tokio::spawn(async move {
        while let Some(block_bytes) = block_rx.recv().await {
            match notify_decoder::decode(&block_bytes) {
                Ok(events) => {
                    for event in events {
                        event_hub.send_event(event).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "server: dropping undecodable block message");
                }
            }
        }
    });

    let channel = config.new_block_channel.clone();
    let subscriber = RedisSubscriber::connect(
        &config.redis_host,
        &config.redis_password,
        &config.new_block_channel,
        move |block_bytes| {
            let _ = block_tx.send(block_bytes);
        },
    )
    .await;

    let subscriber = match subscriber {
        Ok(s) => Arc::new(s),
        Err(err) => {
            error!(error = %err, channel = %channel, "failed to subscribe to broker channel");
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
    let metrics_router = server::metrics::router(state.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics_router).await {
            error!(error = %err, "metrics server error");
        }
    });

    let ws_listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, port = config.port, "failed to bind websocket listener");
            std::process::exit(1);
        }
    };
    let router = server::build_router(state);
    info!(port = config.port, metrics_port = config.metrics_port, "server listening");

    // A broker disconnect is fatal at runtime: race it against the normal
    // shutdown signal so an operator-initiated shutdown still wins if both
    // happen to fire around the same time.
    let fatal_disconnect = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fatal_disconnect_flag = fatal_disconnect.clone();
    let shutdown_subscriber = subscriber.clone();
    let shutdown = async move {
        tokio::select! {
            () = shutdown_signal() => {}
            () = shutdown_subscriber.disconnected() => {
                error!("broker connection dropped unexpectedly, shutting down");
                fatal_disconnect_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    };

    let serve_result = axum::serve(ws_listener, router)
        .with_graceful_shutdown(shutdown)
        .await;

    subscriber.close();
    hub.close();

    if let Err(err) = serve_result {
        error!(error = %err, "server error");
        std::process::exit(1);
    }
    if fatal_disconnect.load(std::sync::atomic::Ordering::SeqCst) {
        std::process::exit(1);
    }
    info!("server shut down gracefully");
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
