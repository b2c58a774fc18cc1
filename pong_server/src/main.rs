use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use pong_server::config::Config;
use pong_server::engine::Engine;
use pong_server::match_queue::MatchQueue;
use pong_server::scheduler::Scheduler;
use pong_server::{health, hub, AppState};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        error!(%info, ?backtrace, "panic");
    }));
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();
    let config = Config::parse();

    let queue = match &config.redis_url {
        Some(url) => match MatchQueue::connect(url).await {
            Ok(queue) => {
                info!("connected to coordination store");
                queue
            }
            Err(err) => {
                // Matchmaking stays refused; bot matches and health survive.
                warn!(%err, "coordination store unreachable, matchmaking disabled");
                MatchQueue::unavailable(err.to_string())
            }
        },
        None => {
            info!("no REDIS_URL configured, using in-process match queue");
            MatchQueue::in_memory()
        }
    };

    let app = AppState::new(queue);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::with_timing(
        &app,
        Engine::new(),
        Duration::from_millis(config.tick_ms),
        Duration::from_millis(config.client_sync_ms),
        shutdown_rx,
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let router = Router::new()
        .route("/ws", get(hub::ws_handler))
        .route("/healthcheck", get(health::healthcheck))
        .layer(cors_layer(&config.cors_origins))
        .with_state(app);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(addr = %config.addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Let the scheduler drain its final tick and close out live games.
    if let Err(err) = scheduler_task.await {
        error!(%err, "scheduler task failed");
    }
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
