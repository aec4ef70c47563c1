//! Host assembly: backend selection, HTTP router and listener startup

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use stackboard_store::{EntityBackend, MemoryBackend, SqliteBackend};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState};
use crate::config::{BackendKind, Config, StorageConfig};
use crate::hub::SyncHub;
use crate::service::PersistenceService;
use crate::ws::{self, SyncState};

/// Open the configured entity backend
pub fn open_backend(storage: &StorageConfig) -> Result<Arc<dyn EntityBackend>> {
    match storage.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Sqlite => {
            let path = storage.database_path();
            let backend = SqliteBackend::open(&path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Ok(Arc::new(backend))
        }
    }
}

/// HTTP application: `/api` routes with CORS and request tracing
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api::api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// A host with both listeners bound and serving
pub struct RunningHost {
    pub service: Arc<PersistenceService>,
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    sync: SyncState,
    http_task: JoinHandle<Result<()>>,
    ws_task: JoinHandle<Result<()>>,
}

impl RunningHost {
    /// Bind both ports from `config` (0 picks a free port) and start serving
    pub async fn start(config: &Config, backend: Arc<dyn EntityBackend>) -> Result<Self> {
        let hub = SyncHub::new(config.sync.channel_capacity);
        let service = Arc::new(PersistenceService::new(backend, hub));
        let bind = &config.server.bind;

        let http_listener = TcpListener::bind((bind.as_str(), config.server.http_port))
            .await
            .with_context(|| format!("Failed to bind HTTP port {}", config.server.http_port))?;
        let ws_listener = TcpListener::bind((bind.as_str(), config.server.ws_port))
            .await
            .with_context(|| format!("Failed to bind sync port {}", config.server.ws_port))?;
        let http_addr = http_listener.local_addr()?;
        let ws_addr = ws_listener.local_addr()?;

        let app = router(AppState {
            service: service.clone(),
            ws_port: ws_addr.port(),
        });
        let http_task = tokio::spawn(async move {
            axum::serve(http_listener, app)
                .await
                .context("HTTP server stopped")
        });
        let sync = SyncState::new(service.clone(), &config.sync);
        let ws_task = tokio::spawn(ws::serve(ws_listener, sync.clone()));

        tracing::info!(
            http = %http_addr,
            ws = %ws_addr,
            backend = service.backend_name(),
            "Host started"
        );
        Ok(Self {
            service,
            http_addr,
            ws_addr,
            sync,
            http_task,
            ws_task,
        })
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.ws_addr)
    }

    /// Resolve when either server stops
    pub async fn wait(&mut self) -> Result<()> {
        tokio::select! {
            result = &mut self.http_task => result.context("HTTP server task failed")?,
            result = &mut self.ws_task => result.context("Sync server task failed")?,
        }
    }
}

/// Stops both listeners and closes open sync connections
impl Drop for RunningHost {
    fn drop(&mut self) {
        self.sync.close_connections();
        self.http_task.abort();
        self.ws_task.abort();
    }
}
