//! Sync channel client
//!
//! Keeps one WebSocket to the host and merges every confirmed change into
//! the shared store. There is no event log: each (re)connect starts with a
//! full snapshot request.
//!
//! ## Lifecycle
//!
//! `SyncClient::connect` spawns a background task that connects, requests
//! a snapshot, then pumps frames in both directions until the socket
//! drops. A dropped socket is retried with a fixed delay up to the
//! configured number of consecutive attempts.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use stackboard_protocol::{decode_server, ClientMessage, Codec, PatchSet, ServerEvent};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{ClientError, ClientResult};
use crate::notice::NoticeBoard;
use crate::store::{LocalStore, SharedStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted
    Failed { message: String },
}

/// Connection state as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub connected: bool,
    pub client_count: usize,
}

/// Merge one server event into the store
///
/// Returns true if the store changed. Presence and error events are not
/// store changes and return false.
pub fn apply_server_event(store: &mut LocalStore, event: &ServerEvent) -> bool {
    match event {
        ServerEvent::Snapshot(records) => {
            store.load_snapshot(records.clone());
            true
        }
        ServerEvent::ItemCreated(item) | ServerEvent::ItemUpdated(item) => {
            store.upsert_item(item.clone());
            true
        }
        ServerEvent::FolderCreated(folder) | ServerEvent::FolderUpdated(folder) => {
            store.upsert_folder(folder.clone());
            true
        }
        ServerEvent::ItemDeleted { id } => store.remove_item(id).is_some(),
        ServerEvent::FolderDeleted { id } => store.remove_folder(id).is_some(),
        ServerEvent::BulkUpdateReceived(patch) => store.apply_patches(patch) > 0,
        ServerEvent::ClientCount(_) | ServerEvent::Error { .. } => false,
    }
}

/// Cloneable handle for queueing messages on the sync channel
///
/// Messages queued while disconnected are sent after the next snapshot
/// request.
#[derive(Debug, Clone)]
pub struct SyncSender {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl SyncSender {
    #[cfg(test)]
    pub(crate) const fn from_channel(outgoing: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { outgoing }
    }

    pub fn send(&self, msg: ClientMessage) -> ClientResult<()> {
        self.outgoing
            .send(msg)
            .map_err(|_| ClientError::Transport("sync channel is closed".to_string()))
    }

    pub fn request_snapshot(&self) -> ClientResult<()> {
        self.send(ClientMessage::RequestSnapshot)
    }

    /// Relay a reorder to every other client
    pub fn send_bulk_update(&self, patch: PatchSet) -> ClientResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.send(ClientMessage::BulkUpdate(patch))
    }
}

#[derive(Clone)]
struct Shared {
    store: SharedStore,
    notices: NoticeBoard,
    status: Arc<Mutex<SyncStatus>>,
    presence: Arc<Mutex<Presence>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Shared {
    async fn set_status(&self, status: SyncStatus) {
        *self.status.lock().await = status;
    }
}

pub struct SyncClient {
    shared: Shared,
    sender: SyncSender,
    task_handle: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Start the background connection task
    pub fn connect(config: &ClientConfig, store: SharedStore, notices: NoticeBoard) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (revision, _) = watch::channel(0);
        let shared = Shared {
            store,
            notices,
            status: Arc::new(Mutex::new(SyncStatus::Connecting)),
            presence: Arc::new(Mutex::new(Presence::default())),
            revision: Arc::new(revision),
        };

        tracing::info!(url = %config.ws_url, "Starting sync client");
        let handle = tokio::spawn(run_sync_loop(
            config.ws_url.clone(),
            config.reconnect,
            config.codec,
            shared.clone(),
            outgoing_rx,
        ));

        Self {
            shared,
            sender: SyncSender {
                outgoing: outgoing_tx,
            },
            task_handle: Some(handle),
        }
    }

    pub fn sender(&self) -> SyncSender {
        self.sender.clone()
    }

    pub fn request_snapshot(&self) -> ClientResult<()> {
        self.sender.request_snapshot()
    }

    pub fn send_bulk_update(&self, patch: PatchSet) -> ClientResult<()> {
        self.sender.send_bulk_update(patch)
    }

    pub async fn status(&self) -> SyncStatus {
        self.shared.status.lock().await.clone()
    }

    pub async fn presence(&self) -> Presence {
        *self.shared.presence.lock().await
    }

    /// Bumped every time a server event changes the store
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
            tracing::info!("Sync client disconnected");
        }
        self.shared.set_status(SyncStatus::Disconnected).await;
        *self.shared.presence.lock().await = Presence::default();
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Why a single connection ended
enum Ended {
    /// Every `SyncSender` was dropped
    Shutdown,
    Dropped,
}

async fn run_sync_loop(
    url: String,
    policy: ReconnectPolicy,
    codec: Codec,
    shared: Shared,
    mut outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
) {
    let mut attempts: u32 = 0;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                tracing::info!(%url, "Sync channel connected");
                attempts = 0;
                shared.set_status(SyncStatus::Connected).await;

                let ended = run_connection(stream, codec, &shared, &mut outgoing_rx).await;
                *shared.presence.lock().await = Presence::default();
                if matches!(ended, Ended::Shutdown) {
                    shared.set_status(SyncStatus::Disconnected).await;
                    break;
                }
                tracing::warn!(%url, "Sync channel dropped");
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Sync channel connection failed");
            }
        }

        attempts += 1;
        if attempts > policy.max_attempts {
            tracing::error!(attempts = policy.max_attempts, "Giving up on sync channel");
            shared.notices.push("Lost connection to the board server");
            shared
                .set_status(SyncStatus::Failed {
                    message: "max reconnect attempts reached".to_string(),
                })
                .await;
            break;
        }

        tracing::info!(attempt = attempts, delay = ?policy.delay, "Reconnecting");
        shared
            .set_status(SyncStatus::Reconnecting { attempt: attempts })
            .await;
        tokio::time::sleep(policy.delay).await;
    }
}

async fn run_connection<S>(
    stream: S,
    codec: Codec,
    shared: &Shared,
    outgoing_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> Ended
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();

    if let Err(e) = send_message(&mut write, codec, &ClientMessage::RequestSnapshot).await {
        tracing::warn!(error = %e, "Failed to request snapshot");
        return Ended::Dropped;
    }

    loop {
        tokio::select! {
            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Sync channel read failed");
                        return Ended::Dropped;
                    }
                    None => return Ended::Dropped,
                };
                if frame.is_close() {
                    return Ended::Dropped;
                }
                match decode_server(&frame) {
                    Ok(Some((_, event))) => {
                        if handle_event(shared, event).await {
                            // Server rejected one of our messages; resync
                            if let Err(e) =
                                send_message(&mut write, codec, &ClientMessage::RequestSnapshot).await
                            {
                                tracing::warn!(error = %e, "Failed to request snapshot");
                                return Ended::Dropped;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "Ignoring undecodable frame"),
                }
            }
            msg = outgoing_rx.recv() => {
                let Some(msg) = msg else {
                    let _ = write.close().await;
                    return Ended::Shutdown;
                };
                if let Err(e) = send_message(&mut write, codec, &msg).await {
                    tracing::warn!(event = msg.name(), error = %e, "Failed to send");
                    return Ended::Dropped;
                }
            }
        }
    }
}

async fn send_message<W>(write: &mut W, codec: Codec, msg: &ClientMessage) -> ClientResult<()>
where
    W: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let frame = codec.encode(msg)?;
    write
        .send(frame)
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Returns true when the event asks for a resync
async fn handle_event(shared: &Shared, event: ServerEvent) -> bool {
    match event {
        ServerEvent::ClientCount(count) => {
            *shared.presence.lock().await = Presence {
                connected: true,
                client_count: count,
            };
            false
        }
        ServerEvent::Error { message } => {
            tracing::warn!(%message, "Server rejected a sync message");
            shared.notices.push(message);
            true
        }
        event => {
            tracing::debug!(event = event.name(), "Applying server event");
            let changed = {
                let mut store = shared.store.write().await;
                apply_server_event(&mut store, &event)
            };
            if changed {
                shared.revision.send_modify(|rev| *rev += 1);
            }
            false
        }
    }
}
