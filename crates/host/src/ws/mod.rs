//! Sync channel server using tokio-tungstenite
//!
//! ## Module Structure
//! - `protocol`: origin validation
//! - `connection`: handshake, hub registration, heartbeat loop
//! - `commands`: client message handlers

mod commands;
mod connection;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::service::PersistenceService;

pub use commands::handle_client_message;
pub use connection::ConnectionInfo;
pub use protocol::OriginPolicy;

/// Everything a connection needs, shared across connections
#[derive(Clone)]
pub struct SyncState {
    pub service: Arc<PersistenceService>,
    pub origins: Arc<OriginPolicy>,
    pub heartbeat: Duration,
    pub idle_timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SyncState {
    pub fn new(service: Arc<PersistenceService>, config: &SyncConfig) -> Self {
        Self {
            service,
            origins: Arc::new(OriginPolicy::new(&config.allowed_origins)),
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Close every open connection; clients see a dropped socket
    pub fn close_connections(&self) {
        self.shutdown.send_replace(true);
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Accept sync connections on `listener` until the task is dropped
pub async fn serve(listener: TcpListener, state: SyncState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Sync channel listening");
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = connection::handle_connection(stream, state).await {
                        tracing::warn!(peer = %peer, error = %e, "Connection error");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Accept failed");
            }
        }
    }
}
