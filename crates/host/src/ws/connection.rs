//! Sync connection handling
//!
//! Manages one WebSocket connection: handshake with origin check, hub
//! registration, a dedicated sender task for broadcasts, and a heartbeat
//! loop reading client messages.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use stackboard_protocol::{decode_client, Codec, ServerEvent};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{
    handshake::server::{Request, Response},
    Message,
};
use tokio_tungstenite::WebSocketStream;

use super::commands::handle_client_message;
use super::SyncState;
use crate::hub::ClientId;

/// Connection metadata extracted during the WebSocket handshake
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub origin: Option<String>,
    pub origin_valid: bool,
}

type Sink<S> = Arc<tokio::sync::Mutex<SplitSink<WebSocketStream<S>, Message>>>;

/// Codec last used by the client; replies follow it
#[derive(Clone, Default)]
struct CodecCell(Arc<Mutex<Codec>>);

impl CodecCell {
    fn get(&self) -> Codec {
        self.0.lock().map(|codec| *codec).unwrap_or_default()
    }

    fn set(&self, codec: Codec) {
        if let Ok(mut current) = self.0.lock() {
            *current = codec;
        }
    }
}

async fn send_event<S>(sink: &Sink<S>, codec: Codec, event: &ServerEvent) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = codec.encode(event)?;
    sink.lock().await.send(frame).await?;
    Ok(())
}

/// Handle a single sync connection
pub async fn handle_connection<S>(stream: S, state: SyncState) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Capture connection info during handshake
    let conn_info = Arc::new(Mutex::new(ConnectionInfo::default()));
    let conn_info_clone = conn_info.clone();
    let policy = state.origins.clone();

    let callback = move |req: &Request,
                         response: Response|
          -> std::result::Result<Response, http::Response<Option<String>>> {
        let origin = req
            .headers()
            .get("origin")
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        if let Ok(mut info) = conn_info_clone.lock() {
            info.origin_valid = policy.check(origin.as_deref());
            info.origin = origin;
        }
        Ok(response)
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let info = conn_info
        .lock()
        .map(|info| info.clone())
        .unwrap_or_default();
    if !info.origin_valid {
        tracing::warn!(origin = ?info.origin, "Rejected connection from invalid origin");
        let _ = ws_tx.close().await;
        return Err(anyhow::anyhow!("Invalid origin"));
    }

    let hub = state.service.hub().clone();
    let subscription = hub.register().await;
    let client_id = subscription.client_id;

    let ws_tx: Sink<S> = Arc::new(tokio::sync::Mutex::new(ws_tx));
    let codec = CodecCell::default();

    let sender_handle = tokio::spawn(forward_broadcasts(
        subscription.events,
        client_id,
        ws_tx.clone(),
        codec.clone(),
        state.clone(),
    ));

    let heartbeat_timeout = state.idle_timeout;
    let mut heartbeat_interval = tokio::time::interval(state.heartbeat);
    let mut last_activity = Instant::now();
    let mut shutdown = state.shutdown_signal();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(client = %client_id, "Host shutting down, closing connection");
                let _ = ws_tx.lock().await.close().await;
                break;
            }

            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    tracing::warn!(
                        client = %client_id,
                        elapsed_secs = last_activity.elapsed().as_secs(),
                        "Heartbeat timeout, dropping connection"
                    );
                    break;
                }

                let mut tx = ws_tx.lock().await;
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    tracing::debug!(client = %client_id, "Ping send failed");
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(frame)) => {
                        last_activity = Instant::now();
                        let reply = match decode_client(&frame) {
                            Ok(Some((used, msg))) => {
                                codec.set(used);
                                handle_client_message(&state.service, client_id, msg).await
                            }
                            Ok(None) => None,
                            Err(e) => {
                                tracing::debug!(client = %client_id, error = %e, "Undecodable frame");
                                Some(ServerEvent::error(format!("Invalid message: {e}")))
                            }
                        };

                        if let Some(event) = reply {
                            if let Err(e) = send_event(&ws_tx, codec.get(), &event).await {
                                tracing::warn!(client = %client_id, error = %e, "Failed to send reply");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    sender_handle.abort();
    hub.unregister(client_id).await;
    Ok(())
}

/// Relay hub broadcasts to this connection, honouring scope
async fn forward_broadcasts<S>(
    mut events: broadcast::Receiver<crate::hub::Envelope>,
    client_id: ClientId,
    ws_tx: Sink<S>,
    codec: CodecCell,
    state: SyncState,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match events.recv().await {
            Ok(envelope) => {
                if !envelope.scope.includes(client_id) {
                    continue;
                }
                if let Err(e) = send_event(&ws_tx, codec.get(), &envelope.event).await {
                    tracing::warn!(client = %client_id, error = %e, "Send failed, stopping sender");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                // Missed events cannot be replayed; push a full snapshot instead
                tracing::warn!(client = %client_id, dropped, "Broadcasts lagged, resyncing client");
                let event = match state.service.snapshot().await {
                    Ok(records) => ServerEvent::Snapshot(records),
                    Err(e) => ServerEvent::error(format!("Failed to fetch data: {e}")),
                };
                if send_event(&ws_tx, codec.get(), &event).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
