//! Local State Store
//!
//! The client's copy of every item and folder. Rendering reads from here,
//! and every mutation (optimistic drops, server events, snapshots) goes
//! through one of the methods below while the caller holds the write
//! guard of a [`SharedStore`].

use std::collections::HashMap;
use std::sync::Arc;

use stackboard_protocol::{
    reparent_orders, sort_ranked, Container, Folder, FolderId, Item, ItemId, PatchSet,
    SnapshotRecord,
};
use tokio::sync::RwLock;

/// Handle passed to every component that reads or mutates board state
pub type SharedStore = Arc<RwLock<LocalStore>>;

pub fn shared(store: LocalStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalStore {
    items: HashMap<ItemId, Item>,
    folders: HashMap<FolderId, Folder>,
}

/// What the board shows for a search query
#[derive(Debug, PartialEq, Eq)]
pub struct BoardView<'a> {
    pub folders: Vec<&'a Folder>,
    /// Loose items when not searching, every matching item otherwise
    pub items: Vec<&'a Item>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all<I, F>(&mut self, items: I, folders: F)
    where
        I: IntoIterator<Item = Item>,
        F: IntoIterator<Item = Folder>,
    {
        self.items = items.into_iter().map(|i| (i.id.clone(), i)).collect();
        self.folders = folders.into_iter().map(|f| (f.id.clone(), f)).collect();
    }

    pub fn load_snapshot(&mut self, records: Vec<SnapshotRecord>) {
        let (items, folders) = SnapshotRecord::partition(records);
        self.replace_all(items, folders);
    }

    /// Insert or fully replace an item, returning the previous version
    pub fn upsert_item(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.clone(), item)
    }

    pub fn upsert_folder(&mut self, folder: Folder) -> Option<Folder> {
        self.folders.insert(folder.id.clone(), folder)
    }

    pub fn remove_item(&mut self, id: &ItemId) -> Option<Item> {
        self.items.remove(id)
    }

    /// Remove a folder and append its members to root in their current order
    pub fn remove_folder(&mut self, id: &FolderId) -> Option<Folder> {
        let folder = self.folders.remove(id)?;

        let members: Vec<ItemId> = self
            .items_in(&Container::Folder(id.clone()))
            .into_iter()
            .map(|i| i.id.clone())
            .collect();
        let root: Vec<i64> = self.orders_in(&Container::Root).collect();
        let orders = reparent_orders(root, members.len());
        for (member, order) in members.into_iter().zip(orders) {
            if let Some(item) = self.items.get_mut(&member) {
                item.folder_id = None;
                item.order = order;
            }
        }
        Some(folder)
    }

    /// Apply placements in order; unknown ids are skipped
    ///
    /// Returns how many placements matched a known entity.
    pub fn apply_patches(&mut self, patches: &PatchSet) -> usize {
        let mut applied = 0;
        for placement in &patches.items {
            if let Some(item) = self.items.get_mut(&placement.id) {
                item.order = placement.order;
                item.folder_id.clone_from(&placement.folder_id);
                applied += 1;
            } else {
                tracing::debug!(id = %placement.id, "Skipping placement for unknown item");
            }
        }
        for placement in &patches.folders {
            if let Some(folder) = self.folders.get_mut(&placement.id) {
                folder.order = placement.order;
                applied += 1;
            } else {
                tracing::debug!(id = %placement.id, "Skipping placement for unknown folder");
            }
        }
        applied
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    /// Members of a container sorted by `(order, id)`
    pub fn items_in(&self, container: &Container) -> Vec<&Item> {
        let folder_id = container.folder_id();
        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|i| i.folder_id.as_ref() == folder_id)
            .collect();
        sort_ranked(&mut items);
        items
    }

    pub fn orders_in<'a>(&'a self, container: &'a Container) -> impl Iterator<Item = i64> + 'a {
        self.items
            .values()
            .filter(move |i| i.folder_id.as_ref() == container.folder_id())
            .map(|i| i.order)
    }

    pub fn folders_sorted(&self) -> Vec<&Folder> {
        let mut folders: Vec<&Folder> = self.folders.values().collect();
        sort_ranked(&mut folders);
        folders
    }

    pub fn loose_items(&self) -> Vec<&Item> {
        self.items_in(&Container::Root)
    }

    /// Case-insensitive title search
    ///
    /// A blank query shows the normal board. Otherwise every item whose
    /// title matches is listed regardless of its folder, and a folder is
    /// kept when its name matches or it holds a matching item.
    pub fn search(&self, query: &str) -> BoardView<'_> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return BoardView {
                folders: self.folders_sorted(),
                items: self.loose_items(),
            };
        }

        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|i| i.title.to_lowercase().contains(&needle))
            .collect();
        sort_ranked(&mut items);

        let folders = self
            .folders_sorted()
            .into_iter()
            .filter(|f| {
                f.name.to_lowercase().contains(&needle)
                    || items.iter().any(|i| i.folder_id.as_ref() == Some(&f.id))
            })
            .collect();

        BoardView { folders, items }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use stackboard_protocol::{Folder, FolderId, Item, ItemId, DEFAULT_ICON};

    pub fn item(id: &str, folder: Option<&str>, order: i64) -> Item {
        Item {
            id: ItemId::from(id),
            title: id.to_string(),
            icon: DEFAULT_ICON.to_string(),
            folder_id: folder.map(FolderId::from),
            order,
        }
    }

    pub fn folder(id: &str, order: i64) -> Folder {
        Folder {
            id: FolderId::from(id),
            name: id.to_string(),
            is_open: true,
            order,
        }
    }
}
