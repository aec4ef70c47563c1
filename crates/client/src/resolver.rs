//! Drop Resolver
//!
//! Turns a drag gesture into the minimal set of rank/container changes.
//! The resolver only reads the store; applying the result is up to the
//! caller. Gestures that cannot be resolved (missing entities, self-drops,
//! folders dropped on items) resolve to `None` and never error.

use stackboard_protocol::{
    front_order, is_strictly_increasing, list_move, next_order, order_in_range, Container, Folder,
    FolderId, Item, ItemId, PatchSet,
};

use crate::store::LocalStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dragged {
    Item(ItemId),
    Folder(FolderId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Item(ItemId),
    Folder(FolderId),
    /// The board itself (root container, end of the folder list)
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gesture {
    pub dragged: Dragged,
    pub target: DropTarget,
}

impl Gesture {
    pub const fn new(dragged: Dragged, target: DropTarget) -> Self {
        Self { dragged, target }
    }

    pub fn item(id: impl Into<ItemId>, target: DropTarget) -> Self {
        Self::new(Dragged::Item(id.into()), target)
    }

    pub fn folder(id: impl Into<FolderId>, target: DropTarget) -> Self {
        Self::new(Dragged::Folder(id.into()), target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Front,
    Back,
}

/// Resolve a gesture against the current store
///
/// Returns `None` when the gesture changes nothing.
pub fn resolve(store: &LocalStore, gesture: &Gesture) -> Option<PatchSet> {
    let patch = match &gesture.dragged {
        Dragged::Item(id) => resolve_item(store, id, &gesture.target)?,
        Dragged::Folder(id) => resolve_folder(store, id, &gesture.target)?,
    };
    (!patch.is_empty()).then_some(patch)
}

fn resolve_item(store: &LocalStore, id: &ItemId, target: &DropTarget) -> Option<PatchSet> {
    let Some(dragged) = store.item(id) else {
        tracing::debug!(item = %id, "Dragged item is not in the store");
        return None;
    };

    match target {
        DropTarget::Item(target_id) if target_id == id => None,
        DropTarget::Item(target_id) => {
            let Some(target) = store.item(target_id) else {
                tracing::debug!(item = %target_id, "Drop target item is not in the store");
                return None;
            };
            if target.folder_id == dragged.folder_id {
                Some(reorder_items(store, dragged, target))
            } else {
                Some(place_item(store, dragged, target.container(), Edge::Back))
            }
        }
        DropTarget::Folder(folder_id) => {
            if store.folder(folder_id).is_none() {
                tracing::debug!(folder = %folder_id, "Drop target folder is not in the store");
                return None;
            }
            let edge = if dragged.folder_id.as_ref() == Some(folder_id) {
                Edge::Front
            } else {
                Edge::Back
            };
            Some(place_item(
                store,
                dragged,
                Container::Folder(folder_id.clone()),
                edge,
            ))
        }
        DropTarget::Background => Some(place_item(store, dragged, Container::Root, Edge::Back)),
    }
}

fn resolve_folder(store: &LocalStore, id: &FolderId, target: &DropTarget) -> Option<PatchSet> {
    let Some(dragged) = store.folder(id) else {
        tracing::debug!(folder = %id, "Dragged folder is not in the store");
        return None;
    };

    match target {
        // Folders never nest
        DropTarget::Item(_) => None,
        DropTarget::Folder(target_id) if target_id == id => None,
        DropTarget::Folder(target_id) => {
            let mut folders = store.folders_sorted();
            let from = folders.iter().position(|f| &f.id == id);
            let Some(to) = folders.iter().position(|f| &f.id == target_id) else {
                tracing::debug!(folder = %target_id, "Drop target folder is not in the store");
                return None;
            };
            list_move(&mut folders, from?, to);
            Some(renumber_folders(&folders))
        }
        DropTarget::Background => {
            let mut others: Vec<&Folder> = store
                .folders_sorted()
                .into_iter()
                .filter(|f| &f.id != id)
                .collect();
            let orders: Vec<i64> = others.iter().map(|f| f.order).collect();
            let order = next_order(orders.iter().copied());
            if is_strictly_increasing(&orders) && order_in_range(order) {
                let mut patch = PatchSet::default();
                if order != dragged.order {
                    patch.folder(id.clone(), order);
                }
                Some(patch)
            } else {
                tracing::debug!("Folder ranks are tied or exhausted, renumbering");
                others.push(dragged);
                Some(renumber_folders(&others))
            }
        }
    }
}

/// Same-container drop: array move, then dense renumber
fn reorder_items(store: &LocalStore, dragged: &Item, target: &Item) -> PatchSet {
    let container = dragged.container();
    let mut siblings = store.items_in(&container);
    let from = siblings.iter().position(|i| i.id == dragged.id);
    let to = siblings.iter().position(|i| i.id == target.id);
    let (Some(from), Some(to)) = (from, to) else {
        return PatchSet::default();
    };
    list_move(&mut siblings, from, to);
    renumber_items(&siblings, container.folder_id())
}

/// Put `dragged` at one edge of `dest`
///
/// Uses `min - 1` / `max + 1` over the other members. If those members
/// already tie, or that rank falls outside the accepted range, the whole
/// destination is renumbered instead.
fn place_item(store: &LocalStore, dragged: &Item, dest: Container, edge: Edge) -> PatchSet {
    let mut others: Vec<&Item> = store
        .items_in(&dest)
        .into_iter()
        .filter(|i| i.id != dragged.id)
        .collect();
    let orders: Vec<i64> = others.iter().map(|i| i.order).collect();
    let order = match edge {
        Edge::Front => front_order(orders.iter().copied()),
        Edge::Back => next_order(orders.iter().copied()),
    };

    if !is_strictly_increasing(&orders) || !order_in_range(order) {
        tracing::debug!(container = %dest, "Destination ranks are tied or exhausted, renumbering");
        match edge {
            Edge::Front => others.insert(0, dragged),
            Edge::Back => others.push(dragged),
        }
        return renumber_items(&others, dest.folder_id());
    }

    let mut patch = PatchSet::default();
    if order != dragged.order || dragged.folder_id.as_ref() != dest.folder_id() {
        patch.item(dragged.id.clone(), order, dest.into_folder_id());
    }
    patch
}

/// Assign 0-based ranks in list order, emitting only what changes
fn renumber_items(ordered: &[&Item], folder_id: Option<&FolderId>) -> PatchSet {
    let mut patch = PatchSet::default();
    for (order, item) in (0_i64..).zip(ordered) {
        if item.order != order || item.folder_id.as_ref() != folder_id {
            patch.item(item.id.clone(), order, folder_id.cloned());
        }
    }
    patch
}

fn renumber_folders(ordered: &[&Folder]) -> PatchSet {
    let mut patch = PatchSet::default();
    for (order, folder) in (0_i64..).zip(ordered) {
        if folder.order != order {
            patch.folder(folder.id.clone(), order);
        }
    }
    patch
}
