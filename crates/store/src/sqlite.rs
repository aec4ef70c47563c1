//! Entity persistence using `SQLite`
//!
//! The connection sits behind a mutex so writes are serialized; every
//! mutation runs in its own transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use stackboard_protocol::{
    next_order, reparent_orders, Deleted, Folder, FolderChanges, FolderId, Item, ItemChanges,
    ItemId, NewFolder, NewItem, SnapshotRecord,
};

use crate::backend::{
    check_order, new_id, required_text, sort_snapshot, unknown_folder, validate_folder_changes,
    validate_item_changes, EntityBackend, ItemDraft, StoreError, StoreResult,
};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_open INTEGER NOT NULL DEFAULT 1,
        position INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        icon TEXT NOT NULL,
        folder_id TEXT REFERENCES folders(id),
        position INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS items_by_folder ON items (folder_id, position);
";

const ITEM_COLUMNS: &str = "id, title, icon, folder_id, position";
const FOLDER_COLUMNS: &str = "id, name, is_open, position";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: ItemId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        icon: row.get(2)?,
        folder_id: row.get::<_, Option<String>>(3)?.map(FolderId::new),
        order: row.get(4)?,
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        is_open: row.get(2)?,
        order: row.get(3)?,
    })
}

fn find_item(tx: &Transaction<'_>, id: &ItemId) -> StoreResult<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
    Ok(tx.query_row(&sql, [id.as_str()], item_from_row).optional()?)
}

fn find_folder(tx: &Transaction<'_>, id: &FolderId) -> StoreResult<Option<Folder>> {
    let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
    Ok(tx.query_row(&sql, [id.as_str()], folder_from_row).optional()?)
}

fn check_folder(tx: &Transaction<'_>, folder_id: Option<&FolderId>) -> StoreResult<()> {
    match folder_id {
        Some(id) if find_folder(tx, id)?.is_none() => Err(unknown_folder(id)),
        _ => Ok(()),
    }
}

/// Highest item rank in a container, if it has any items
fn max_item_position(tx: &Transaction<'_>, folder_id: Option<&FolderId>) -> StoreResult<Option<i64>> {
    Ok(tx.query_row(
        "SELECT MAX(position) FROM items WHERE folder_id IS ?1",
        [folder_id.map(FolderId::as_str)],
        |row| row.get(0),
    )?)
}

/// Entity store backed by a single `SQLite` connection
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage("connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl EntityBackend for SqliteBackend {
    async fn snapshot(&self) -> StoreResult<Vec<SnapshotRecord>> {
        let conn = self.lock()?;
        let mut records = Vec::new();

        let mut stmt = conn.prepare(&format!("SELECT {FOLDER_COLUMNS} FROM folders"))?;
        for folder in stmt.query_map([], folder_from_row)? {
            records.push(SnapshotRecord::Folder(folder?));
        }
        let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items"))?;
        for item in stmt.query_map([], item_from_row)? {
            records.push(SnapshotRecord::Item(item?));
        }

        sort_snapshot(&mut records);
        Ok(records)
    }

    async fn create_item(&self, new: NewItem) -> StoreResult<Item> {
        let draft = ItemDraft::validate(new)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        check_folder(&tx, draft.folder_id.as_ref())?;

        let order = match draft.order {
            Some(order) => order,
            None => {
                let max = max_item_position(&tx, draft.folder_id.as_ref())?;
                check_order(next_order(max))?
            }
        };
        let item = draft.into_item(order);
        tx.execute(
            "INSERT INTO items (id, title, icon, folder_id, position) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.id.as_str(),
                item.title,
                item.icon,
                item.folder_id.as_ref().map(FolderId::as_str),
                item.order
            ],
        )?;
        tx.commit()?;
        Ok(item)
    }

    async fn create_folder(&self, new: NewFolder) -> StoreResult<Folder> {
        let name = required_text("name", &new.name)?;
        let order = new.order.map(check_order).transpose()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let order = match order {
            Some(order) => order,
            None => {
                let max: Option<i64> =
                    tx.query_row("SELECT MAX(position) FROM folders", [], |row| row.get(0))?;
                check_order(next_order(max))?
            }
        };
        let folder = Folder {
            id: FolderId::new(new_id()),
            name,
            is_open: true,
            order,
        };
        tx.execute(
            "INSERT INTO folders (id, name, is_open, position) VALUES (?1, ?2, ?3, ?4)",
            params![folder.id.as_str(), folder.name, folder.is_open, folder.order],
        )?;
        tx.commit()?;
        Ok(folder)
    }

    async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> StoreResult<Item> {
        let changes = validate_item_changes(changes)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if let Some(folder_id) = &changes.folder_id {
            check_folder(&tx, folder_id.as_ref())?;
        }

        let mut item = find_item(&tx, id)?.ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;
        item.apply_changes(&changes);
        tx.execute(
            "UPDATE items SET title = ?2, icon = ?3, folder_id = ?4, position = ?5 WHERE id = ?1",
            params![
                item.id.as_str(),
                item.title,
                item.icon,
                item.folder_id.as_ref().map(FolderId::as_str),
                item.order
            ],
        )?;
        tx.commit()?;
        Ok(item)
    }

    async fn update_folder(&self, id: &FolderId, changes: &FolderChanges) -> StoreResult<Folder> {
        let changes = validate_folder_changes(changes)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut folder =
            find_folder(&tx, id)?.ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder.apply_changes(&changes);
        tx.execute(
            "UPDATE folders SET name = ?2, is_open = ?3, position = ?4 WHERE id = ?1",
            params![folder.id.as_str(), folder.name, folder.is_open, folder.order],
        )?;
        tx.commit()?;
        Ok(folder)
    }

    async fn delete_item(&self, id: &ItemId) -> StoreResult<Deleted> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM items WHERE id = ?1", [id.as_str()])?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("item {id}")));
        }
        Ok(Deleted::new(id.as_str()))
    }

    async fn delete_folder(&self, id: &FolderId) -> StoreResult<Deleted> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if find_folder(&tx, id)?.is_none() {
            return Err(StoreError::NotFound(format!("folder {id}")));
        }

        let members: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM items WHERE folder_id = ?1 ORDER BY position, id",
            )?;
            let rows = stmt.query_map([id.as_str()], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let orders = reparent_orders(max_item_position(&tx, None)?, members.len());
        for (member, order) in members.iter().zip(orders) {
            tx.execute(
                "UPDATE items SET folder_id = NULL, position = ?2 WHERE id = ?1",
                params![member, order],
            )?;
        }
        tx.execute("DELETE FROM folders WHERE id = ?1", [id.as_str()])?;
        tx.commit()?;

        tracing::debug!(folder = %id, moved = members.len(), "folder deleted, members moved to root");
        Ok(Deleted::new(id.as_str()))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
