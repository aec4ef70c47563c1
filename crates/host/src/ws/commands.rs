//! Sync channel command handlers
//!
//! Mutations go through the persistence service, which broadcasts the
//! confirmed entity to everyone. Only snapshots and errors are answered
//! directly to the requesting connection.

use stackboard_protocol::{ClientMessage, ServerEvent};

use crate::hub::ClientId;
use crate::service::PersistenceService;

/// Handle one decoded client message
///
/// Returns the event to send back to this connection only, if any.
#[tracing::instrument(skip(service, msg), fields(event = msg.name()), level = "debug")]
pub async fn handle_client_message(
    service: &PersistenceService,
    client_id: ClientId,
    msg: ClientMessage,
) -> Option<ServerEvent> {
    let result = match msg {
        ClientMessage::RequestSnapshot => {
            return Some(match service.snapshot().await {
                Ok(records) => ServerEvent::Snapshot(records),
                Err(e) => failure("Failed to fetch data", &e),
            });
        }
        ClientMessage::CreateItem(new) => service.create_item(new).await.map(drop),
        ClientMessage::CreateFolder(new) => service.create_folder(new).await.map(drop),
        ClientMessage::UpdateItem { id, changes } => {
            service.update_item(&id, &changes).await.map(drop)
        }
        ClientMessage::UpdateFolder { id, changes } => {
            service.update_folder(&id, &changes).await.map(drop)
        }
        ClientMessage::DeleteItem { id } => service.delete_item(&id).await.map(drop),
        ClientMessage::DeleteFolder { id } => service.delete_folder(&id).await.map(drop),
        ClientMessage::BulkUpdate(patch) => {
            return service
                .bulk_update(client_id, &patch)
                .await
                .err()
                .map(|e| failure("Failed to process bulk update", &e));
        }
    };

    result.err().map(|e| failure("Request failed", &e))
}

fn failure(context: &str, error: &dyn std::error::Error) -> ServerEvent {
    tracing::warn!(error = %error, "{context}");
    ServerEvent::error(format!("{context}: {error}"))
}
