// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use tessera_node::config::NodeConfig;
use tessera_node::server::{build_router, AppState};
use tessera_node::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    init_telemetry();

    let cfg = match NodeConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    tracing::info!("Initializing Tessera Node with config: {:?}", redacted(&cfg));

    let shutdown = CancellationToken::new();
    let state = match AppState::bootstrap(&cfg, shutdown.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };
    let supervisor = state.supervisor.clone();

    let app = build_router(state);

    let addr = cfg.bind_addr;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on {}", addr);

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await;

    supervisor.shutdown(cfg.replication.shutdown_grace).await;

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn redacted(cfg: &NodeConfig) -> NodeConfig {
    NodeConfig {
        admin_password: "***".into(),
        ..cfg.clone()
    }
}
