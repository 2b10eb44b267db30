use std::sync::Arc;

use polaris_engine::{AccessManager, AllowAll, Polaris};
use polaris_store::{InMemoryMetaStore, MetaStore};
use tokio::net::TcpListener;

use crate::auth::{DeviceAuthenticator, HeaderDeviceAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Polaris metadata server.
pub struct PolarisServer {
    config: ServerConfig,
    state: AppState,
}

impl PolarisServer {
    /// Server over an in-memory store that trusts the device header and
    /// grants every device access to every store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(InMemoryMetaStore::new()),
            Arc::new(AllowAll),
            Arc::new(HeaderDeviceAuth),
        )
    }

    pub fn with_parts(
        config: ServerConfig,
        store: Arc<dyn MetaStore>,
        access: Arc<dyn AccessManager>,
        auth: Arc<dyn DeviceAuthenticator>,
    ) -> Self {
        let polaris = Polaris::new(store, access, config.engine.clone());
        Self {
            config,
            state: AppState { polaris, auth },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.permissive_cors)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("Polaris server listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
