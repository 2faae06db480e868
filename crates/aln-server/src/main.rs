//! Binary entry point: parses configuration, wires the ambient stack
//! (tracing + in-memory log buffer), bootstraps the domain services, and
//! serves the merged HTTP/WebSocket router. Structure grounded on
//! `relay-server/src/main.rs`'s tracing-subscriber registry + fmt layer and
//! its handshake-then-serve sequencing.

mod auth;
mod config;
mod display;
mod http;
mod log_capture;
mod state;
mod ws;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::log_capture::LogBuffer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let log_buffer = Arc::new(LogBuffer::new());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info,tower_http=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(log_buffer.clone())
        .init();

    let bootstrap = AppState::bootstrap(config.clone(), log_buffer).await?;
    let state = bootstrap.state;

    state.spawn_player_monitor(bootstrap.player_events_rx);
    state.spawn_admin_auth_sweep();
    state.spawn_offline_queue_drainer();
    tokio::spawn(state.broadcast.clone().run(bootstrap.events_rx));

    let cors = build_cors(&config.cors_origins);

    let app = axum::Router::new()
        .merge(http::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "orchestrator listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| !o.is_empty())
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    if allowed.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
