use std::sync::Arc;

use strata_maintenance::MaintenanceJobController;
use strata_store::{ConfigProvider, FileConfigProvider, FileStore};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Strata object storage server.
pub struct StrataServer {
    config: ServerConfig,
    state: AppState,
}

impl StrataServer {
    /// Server over a file store configured by `config.store`.
    pub fn new(config: ServerConfig) -> Self {
        let provider: Arc<dyn ConfigProvider> =
            Arc::new(FileConfigProvider::new(config.store.clone()));
        let store = Arc::new(FileStore::new(provider.clone()));
        let jobs = Arc::new(MaintenanceJobController::new(provider));
        Self::with_state(config, AppState::new(store, jobs))
    }

    pub fn with_state(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(
            self.state.clone(),
            &self.config.base_path(),
            self.config.max_body_bytes,
        )
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            base = %self.config.base_path(),
            "strata server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = StrataServer::new(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!server.state().jobs.is_running());
    }

    #[test]
    fn router_builds() {
        let server = StrataServer::new(ServerConfig::default());
        let _router = server.router();
    }
}
