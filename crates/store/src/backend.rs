//! Backend trait, error type and the validation shared by both backends

use async_trait::async_trait;
use stackboard_protocol::{
    order_in_range, Deleted, Folder, FolderChanges, FolderId, Item, ItemChanges, ItemId,
    NewFolder, NewItem, SnapshotRecord, DEFAULT_ICON, MAX_ORDER, MIN_ORDER,
};

/// Persistence failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Missing or blank required field, or a reference to an unknown folder
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable store of truth for items and folders
///
/// Implementations own id assignment, append-on-create ranking and the
/// cascade reparent performed when a folder is deleted. Each method is one
/// logical unit: a failure leaves the stored state untouched.
#[async_trait]
pub trait EntityBackend: Send + Sync {
    /// Every entity, tagged by type, sorted by `(order, type, id)`
    async fn snapshot(&self) -> StoreResult<Vec<SnapshotRecord>>;

    /// Insert an item; without an explicit order it goes after its last sibling
    async fn create_item(&self, new: NewItem) -> StoreResult<Item>;

    /// Insert a folder (open by default); appended when no order is given
    async fn create_folder(&self, new: NewFolder) -> StoreResult<Folder>;

    /// Merge a partial update and return the full item
    async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> StoreResult<Item>;

    /// Merge a partial update and return the full folder
    async fn update_folder(&self, id: &FolderId, changes: &FolderChanges) -> StoreResult<Folder>;

    async fn delete_item(&self, id: &ItemId) -> StoreResult<Deleted>;

    /// Move the folder's items to root (appended, relative order kept), then delete it
    async fn delete_folder(&self, id: &FolderId) -> StoreResult<Deleted>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Fresh server-issued identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trim a required text field, rejecting blanks
pub fn required_text(field: &str, value: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Reject ranks outside `MIN_ORDER..=MAX_ORDER`, given or computed
pub fn check_order(order: i64) -> StoreResult<i64> {
    if order_in_range(order) {
        Ok(order)
    } else {
        Err(StoreError::Validation(format!(
            "order {order} is outside {MIN_ORDER}..={MAX_ORDER}"
        )))
    }
}

/// Validated fields of a new item (order still unresolved)
pub struct ItemDraft {
    pub title: String,
    pub icon: String,
    pub folder_id: Option<FolderId>,
    pub order: Option<i64>,
}

impl ItemDraft {
    pub fn validate(new: NewItem) -> StoreResult<Self> {
        let title = required_text("title", &new.title)?;
        let icon = new
            .icon
            .filter(|icon| !icon.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ICON.to_string());
        let order = new.order.map(check_order).transpose()?;
        Ok(Self {
            title,
            icon,
            folder_id: new.folder_id,
            order,
        })
    }

    pub fn into_item(self, order: i64) -> Item {
        Item {
            id: ItemId::new(new_id()),
            title: self.title,
            icon: self.icon,
            folder_id: self.folder_id,
            order,
        }
    }
}

/// Normalize an item update: trims the title and rejects blanks
pub fn validate_item_changes(changes: &ItemChanges) -> StoreResult<ItemChanges> {
    let mut changes = changes.clone();
    if let Some(title) = &changes.title {
        changes.title = Some(required_text("title", title)?);
    }
    if let Some(order) = changes.order {
        check_order(order)?;
    }
    Ok(changes)
}

/// Normalize a folder update: trims the name and rejects blanks
pub fn validate_folder_changes(changes: &FolderChanges) -> StoreResult<FolderChanges> {
    let mut changes = changes.clone();
    if let Some(name) = &changes.name {
        changes.name = Some(required_text("name", name)?);
    }
    if let Some(order) = changes.order {
        check_order(order)?;
    }
    Ok(changes)
}

pub fn unknown_folder(id: &FolderId) -> StoreError {
    StoreError::Validation(format!("folder {id} does not exist"))
}

/// Sort snapshot rows by `(order, type, id)`; folders before items on ties
pub fn sort_snapshot(records: &mut [SnapshotRecord]) {
    fn key(record: &SnapshotRecord) -> (i64, u8, &str) {
        match record {
            SnapshotRecord::Folder(f) => (f.order, 0, f.id.as_str()),
            SnapshotRecord::Item(i) => (i.order, 1, i.id.as_str()),
        }
    }
    records.sort_by(|a, b| key(a).cmp(&key(b)));
}
