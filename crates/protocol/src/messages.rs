//! Sync channel events
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`. The enums are
//! closed: an unknown event name or a payload with missing fields fails to
//! decode instead of being passed through.

use serde::{Deserialize, Serialize};

use crate::model::{
    Folder, FolderChanges, FolderId, Item, ItemChanges, ItemId, NewFolder, NewItem, SnapshotRecord,
};

/// New rank (and container) for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPlacement {
    pub id: ItemId,
    pub order: i64,
    #[serde(deserialize_with = "crate::messages::nullable_folder")]
    pub folder_id: Option<FolderId>,
}

/// New rank for one folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPlacement {
    pub id: FolderId,
    pub order: i64,
}

fn nullable_folder<'de, D>(deserializer: D) -> Result<Option<FolderId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<FolderId>::deserialize(deserializer)
}

/// Ordered list of rank/container patches
///
/// Produced by the drop resolver, applied optimistically by the local
/// store, and carried by `bulk-update` / `bulk-update-received`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemPlacement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<FolderPlacement>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.folders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.folders.len()
    }

    pub fn item(&mut self, id: ItemId, order: i64, folder_id: Option<FolderId>) {
        self.items.push(ItemPlacement {
            id,
            order,
            folder_id,
        });
    }

    pub fn folder(&mut self, id: FolderId, order: i64) {
        self.folders.push(FolderPlacement { id, order });
    }

    pub fn touches_item(&self, id: &ItemId) -> bool {
        self.items.iter().any(|p| &p.id == id)
    }

    pub fn touches_folder(&self, id: &FolderId) -> bool {
        self.folders.iter().any(|p| &p.id == id)
    }

    /// True if both patch sets name at least one common entity
    pub fn overlaps(&self, other: &Self) -> bool {
        self.items.iter().any(|p| other.touches_item(&p.id))
            || self.folders.iter().any(|p| other.touches_folder(&p.id))
    }
}

/// Client → server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    RequestSnapshot,
    CreateItem(NewItem),
    CreateFolder(NewFolder),
    UpdateItem { id: ItemId, changes: ItemChanges },
    UpdateFolder { id: FolderId, changes: FolderChanges },
    DeleteItem { id: ItemId },
    DeleteFolder { id: FolderId },
    BulkUpdate(PatchSet),
}

impl ClientMessage {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestSnapshot => "request-snapshot",
            Self::CreateItem(_) => "create-item",
            Self::CreateFolder(_) => "create-folder",
            Self::UpdateItem { .. } => "update-item",
            Self::UpdateFolder { .. } => "update-folder",
            Self::DeleteItem { .. } => "delete-item",
            Self::DeleteFolder { .. } => "delete-folder",
            Self::BulkUpdate(_) => "bulk-update",
        }
    }
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Snapshot(Vec<SnapshotRecord>),
    ItemCreated(Item),
    ItemUpdated(Item),
    ItemDeleted { id: ItemId },
    FolderCreated(Folder),
    FolderUpdated(Folder),
    FolderDeleted { id: FolderId },
    BulkUpdateReceived(PatchSet),
    ClientCount(usize),
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::ItemCreated(_) => "item-created",
            Self::ItemUpdated(_) => "item-updated",
            Self::ItemDeleted { .. } => "item-deleted",
            Self::FolderCreated(_) => "folder-created",
            Self::FolderUpdated(_) => "folder-updated",
            Self::FolderDeleted { .. } => "folder-deleted",
            Self::BulkUpdateReceived(_) => "bulk-update-received",
            Self::ClientCount(_) => "client-count",
            Self::Error { .. } => "error",
        }
    }
}
