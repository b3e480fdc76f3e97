//! # Call Bridge Backend - Main Application Entry Point
//!
//! Entry point for the call-bridge-backend server: a real-time audio bridge
//! between a telephony media-stream transport and a conversational
//! voice-agent session.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state and metrics
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging and metrics collection
//! - **handlers**: HTTP request handlers
//! - **error**: HTTP error types and the bridge fault taxonomy
//! - **websocket**: the per-call bridge actor (`/ws/media-stream`)
//! - **bridge**: chunk buffer, mark tracking, line protocol, call state
//! - **agent**: voice-agent session client, playback ledger, tool surface
//!
//! Startup fails fast on invalid configuration (most importantly a missing
//! agent credential); nothing binds until validation passes.

mod agent;      // Voice-agent session, playback ledger, tools (agent/ directory)
mod bridge;     // Call bridge core (bridge/ directory)
mod config;     // Configuration management (config.rs)
mod error;      // Error handling types (error.rs)
mod handlers;   // HTTP request handlers (handlers/ directory)
mod health;     // Health check endpoints (health.rs)
mod middleware; // Custom middleware (middleware/ directory)
mod state;      // Application state management (state.rs)
mod websocket;  // Media-stream bridge actor (websocket.rs)

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handlers and polled by main.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present (credentials live there)
    dotenv::dotenv().ok();

    init_tracing()?;

    // Fail fast: an unusable configuration must never accept a call
    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-bridge-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} ({} Hz, {}s chunks)",
        config.server.host, config.server.port, config.audio.sample_rate, config.audio.chunk_duration_s
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            // Telephony media streams connect here
            .route("/ws/media-stream", web::get().to(websocket::media_stream))
            // Health check at root level for load balancer probes
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish or a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Graceful stop: in-flight calls drain before the listener dies
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` controls the filter; the default keeps bridge internals at
/// debug and the web framework at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_bridge_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that set the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag without busy-waiting.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
