use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use terralens_gateway::config;
use terralens_gateway::engine::HttpEngineClient;
use terralens_gateway::registry::{spawn_sweep_task, HandleRegistry};
use terralens_gateway::routes::{self, AppState};
use terralens_gateway::tools::{Dispatcher, ToolContext};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Terralens Gateway starting");

    // Load configuration — fail loudly on a broken file.
    let config_path = std::env::var("TERRALENS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/system.toml"));

    let system_config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration, refusing to start");
            std::process::exit(1);
        }
    };

    // Install Prometheus metrics recorder.
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // Engine client; base URL can be overridden from the environment.
    let mut engine_config = system_config.engine.clone();
    if let Ok(url) = std::env::var("ENGINE_BASE_URL") {
        engine_config.base_url = url;
    }

    let http = reqwest::Client::builder()
        .user_agent("Terralens-Gateway/0.1")
        .timeout(Duration::from_secs(engine_config.request_timeout_seconds))
        .build()
        .expect("Failed to build HTTP client");

    let engine = Arc::new(HttpEngineClient::new(http, &engine_config));

    // Handle registry plus its background expiry sweep.
    let registry = HandleRegistry::new(&system_config.registry);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _sweep_handle = spawn_sweep_task(
        registry.clone(),
        Duration::from_secs(system_config.registry.sweep_interval_seconds),
        shutdown_rx,
    );

    let dispatcher = Dispatcher::new(ToolContext {
        registry,
        engine,
        limits: system_config.limits.clone(),
    });

    let state = Arc::new(AppState {
        dispatcher,
        metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(routes::health_handler))
        .route("/metrics", get(routes::metrics_handler))
        .route("/invoke", post(routes::invoke_handler))
        .with_state(state);

    let port: u16 = std::env::var("TERRALENS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(system_config.server.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!(port = port, "Terralens Gateway listening");

    axum::serve(listener, app).await.expect("HTTP server error");

    let _ = shutdown_tx.send(true);
}
