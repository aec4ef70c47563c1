//! In-memory entity backend
//!
//! Ephemeral storage used by tests and by `--memory` hosts. Everything is
//! lost when the backend is dropped.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use stackboard_protocol::{
    next_order, reparent_orders, sort_ranked, Deleted, Folder, FolderChanges, FolderId, Item,
    ItemChanges, ItemId, NewFolder, NewItem, SnapshotRecord,
};

use crate::backend::{
    check_order, new_id, required_text, sort_snapshot, unknown_folder, validate_folder_changes,
    validate_item_changes, EntityBackend, ItemDraft, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    items: HashMap<ItemId, Item>,
    folders: HashMap<FolderId, Folder>,
}

impl Tables {
    fn orders_in<'a>(
        &'a self,
        folder_id: Option<&'a FolderId>,
    ) -> impl Iterator<Item = i64> + 'a {
        self.items
            .values()
            .filter(move |item| item.folder_id.as_ref() == folder_id)
            .map(|item| item.order)
    }

    fn check_folder(&self, folder_id: Option<&FolderId>) -> StoreResult<()> {
        match folder_id {
            Some(id) if !self.folders.contains_key(id) => Err(unknown_folder(id)),
            _ => Ok(()),
        }
    }
}

/// Backend holding both tables behind one lock
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait]
impl EntityBackend for MemoryBackend {
    async fn snapshot(&self) -> StoreResult<Vec<SnapshotRecord>> {
        let tables = self.read()?;
        let mut records: Vec<SnapshotRecord> = tables
            .folders
            .values()
            .cloned()
            .map(SnapshotRecord::Folder)
            .chain(tables.items.values().cloned().map(SnapshotRecord::Item))
            .collect();
        sort_snapshot(&mut records);
        Ok(records)
    }

    async fn create_item(&self, new: NewItem) -> StoreResult<Item> {
        let draft = ItemDraft::validate(new)?;
        let mut tables = self.write()?;
        tables.check_folder(draft.folder_id.as_ref())?;

        let order = match draft.order {
            Some(order) => order,
            None => check_order(next_order(tables.orders_in(draft.folder_id.as_ref())))?,
        };
        let item = draft.into_item(order);
        tables.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn create_folder(&self, new: NewFolder) -> StoreResult<Folder> {
        let name = required_text("name", &new.name)?;
        let order = new.order.map(check_order).transpose()?;
        let mut tables = self.write()?;

        let order = match order {
            Some(order) => order,
            None => check_order(next_order(tables.folders.values().map(|f| f.order)))?,
        };
        let folder = Folder {
            id: FolderId::new(new_id()),
            name,
            is_open: true,
            order,
        };
        tables.folders.insert(folder.id.clone(), folder.clone());
        Ok(folder)
    }

    async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> StoreResult<Item> {
        let changes = validate_item_changes(changes)?;
        let mut tables = self.write()?;
        if let Some(folder_id) = &changes.folder_id {
            tables.check_folder(folder_id.as_ref())?;
        }

        let item = tables
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;
        item.apply_changes(&changes);
        Ok(item.clone())
    }

    async fn update_folder(&self, id: &FolderId, changes: &FolderChanges) -> StoreResult<Folder> {
        let changes = validate_folder_changes(changes)?;
        let mut tables = self.write()?;

        let folder = tables
            .folders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder.apply_changes(&changes);
        Ok(folder.clone())
    }

    async fn delete_item(&self, id: &ItemId) -> StoreResult<Deleted> {
        let mut tables = self.write()?;
        tables
            .items
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;
        Ok(Deleted::new(id.as_str()))
    }

    async fn delete_folder(&self, id: &FolderId) -> StoreResult<Deleted> {
        let mut tables = self.write()?;
        if !tables.folders.contains_key(id) {
            return Err(StoreError::NotFound(format!("folder {id}")));
        }

        let mut members: Vec<Item> = tables
            .items
            .values()
            .filter(|item| item.folder_id.as_ref() == Some(id))
            .cloned()
            .collect();
        sort_ranked(&mut members);
        let orders = reparent_orders(tables.orders_in(None), members.len());

        for (member, order) in members.into_iter().zip(orders) {
            if let Some(item) = tables.items.get_mut(&member.id) {
                item.folder_id = None;
                item.order = order;
            }
        }
        tables.folders.remove(id);
        tracing::debug!(folder = %id, "folder deleted, members moved to root");
        Ok(Deleted::new(id.as_str()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
