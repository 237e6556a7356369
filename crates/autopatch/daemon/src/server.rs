//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::pipeline::build_orchestrator;
use autopatch_orchestrator::SelfUpdateOrchestrator;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Autopatch daemon server
pub struct Server {
    config: DaemonConfig,
    orchestrator: Arc<SelfUpdateOrchestrator>,
}

impl Server {
    /// Build every pipeline component from the configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let orchestrator = build_orchestrator(&config).await?;
        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Arc<SelfUpdateOrchestrator> {
        &self.orchestrator
    }

    /// Serve the control surface until Ctrl+C or SIGTERM, then stop the
    /// pipeline.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.orchestrator.clone(), self.config.dry_run);
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, dry_run = self.config.dry_run, "autopatch daemon listening");

        if self.config.auto_start {
            self.orchestrator.start().await?;
        }

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("autopatch daemon shutting down");

        // Stop the pipeline even when the server failed
        self.orchestrator.stop().await;

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
