//! Persistence service: the single writer in front of the entity backend
//!
//! Every successful mutation is broadcast on the hub carrying exactly the
//! entity the backend confirmed, whichever surface (HTTP or sync channel)
//! issued it. Mutations hold the write gate from the backend call through
//! the publish, so broadcasts go out in commit order.

use std::sync::Arc;

use tokio::sync::Mutex;

use stackboard_protocol::{
    Deleted, Folder, FolderChanges, FolderId, Item, ItemChanges, ItemId, NewFolder, NewItem,
    PatchSet, ServerEvent, SnapshotRecord,
};
use stackboard_store::{EntityBackend, StoreError, StoreResult};

use crate::hub::{ClientId, Scope, SyncHub};

/// A bulk update stopped part way through
#[derive(Debug, thiserror::Error)]
#[error("bulk update stopped after {} patches: {source}", .applied.len())]
pub struct BulkUpdateError {
    /// Patches applied before the failure (already broadcast)
    pub applied: PatchSet,
    pub source: StoreError,
}

pub struct PersistenceService {
    backend: Arc<dyn EntityBackend>,
    hub: SyncHub,
    write_gate: Mutex<()>,
}

impl PersistenceService {
    pub fn new(backend: Arc<dyn EntityBackend>, hub: SyncHub) -> Self {
        Self {
            backend,
            hub,
            write_gate: Mutex::new(()),
        }
    }

    pub const fn hub(&self) -> &SyncHub {
        &self.hub
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn snapshot(&self) -> StoreResult<Vec<SnapshotRecord>> {
        self.backend.snapshot().await
    }

    pub async fn create_item(&self, new: NewItem) -> StoreResult<Item> {
        let _gate = self.write_gate.lock().await;
        let item = self.backend.create_item(new).await?;
        tracing::info!(item = %item.id, folder = ?item.folder_id, order = item.order, "Item created");
        self.hub.publish(Scope::All, ServerEvent::ItemCreated(item.clone()));
        Ok(item)
    }

    pub async fn create_folder(&self, new: NewFolder) -> StoreResult<Folder> {
        let _gate = self.write_gate.lock().await;
        let folder = self.backend.create_folder(new).await?;
        tracing::info!(folder = %folder.id, order = folder.order, "Folder created");
        self.hub.publish(Scope::All, ServerEvent::FolderCreated(folder.clone()));
        Ok(folder)
    }

    pub async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> StoreResult<Item> {
        let _gate = self.write_gate.lock().await;
        let item = self.backend.update_item(id, changes).await?;
        self.hub.publish(Scope::All, ServerEvent::ItemUpdated(item.clone()));
        Ok(item)
    }

    pub async fn update_folder(&self, id: &FolderId, changes: &FolderChanges) -> StoreResult<Folder> {
        let _gate = self.write_gate.lock().await;
        let folder = self.backend.update_folder(id, changes).await?;
        self.hub.publish(Scope::All, ServerEvent::FolderUpdated(folder.clone()));
        Ok(folder)
    }

    pub async fn delete_item(&self, id: &ItemId) -> StoreResult<Deleted> {
        let _gate = self.write_gate.lock().await;
        let deleted = self.backend.delete_item(id).await?;
        tracing::info!(item = %id, "Item deleted");
        self.hub
            .publish(Scope::All, ServerEvent::ItemDeleted { id: id.clone() });
        Ok(deleted)
    }

    pub async fn delete_folder(&self, id: &FolderId) -> StoreResult<Deleted> {
        let _gate = self.write_gate.lock().await;
        let deleted = self.backend.delete_folder(id).await?;
        tracing::info!(folder = %id, "Folder deleted");
        self.hub
            .publish(Scope::All, ServerEvent::FolderDeleted { id: id.clone() });
        Ok(deleted)
    }

    /// Persist a batch of placements issued by `origin`
    ///
    /// Patches are applied in order. Entities that no longer exist are
    /// skipped. Any other failure stops the batch. Whatever was applied is
    /// relayed to every client except `origin` as `bulk-update-received`.
    pub async fn bulk_update(
        &self,
        origin: ClientId,
        patch: &PatchSet,
    ) -> Result<PatchSet, BulkUpdateError> {
        let _gate = self.write_gate.lock().await;
        let mut applied = PatchSet::default();
        let outcome = self.apply_patches(patch, &mut applied).await;

        if !applied.is_empty() {
            tracing::info!(client = %origin, patches = applied.len(), "Bulk update applied");
            self.hub.publish(
                Scope::AllExcept(origin),
                ServerEvent::BulkUpdateReceived(applied.clone()),
            );
        }

        match outcome {
            Ok(()) => Ok(applied),
            Err(source) => Err(BulkUpdateError { applied, source }),
        }
    }

    async fn apply_patches(&self, patch: &PatchSet, applied: &mut PatchSet) -> StoreResult<()> {
        for placement in &patch.items {
            let changes = ItemChanges::placement(placement.order, placement.folder_id.clone());
            match self.backend.update_item(&placement.id, &changes).await {
                Ok(_) => applied.items.push(placement.clone()),
                Err(StoreError::NotFound(what)) => {
                    tracing::warn!(%what, "Skipping bulk patch for missing entity");
                }
                Err(e) => return Err(e),
            }
        }
        for placement in &patch.folders {
            let changes = FolderChanges::order(placement.order);
            match self.backend.update_folder(&placement.id, &changes).await {
                Ok(_) => applied.folders.push(placement.clone()),
                Err(StoreError::NotFound(what)) => {
                    tracing::warn!(%what, "Skipping bulk patch for missing entity");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
