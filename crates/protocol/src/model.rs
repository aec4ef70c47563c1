//! Entity shapes shared by the host and its clients
//!
//! Items live either in a folder or in the implicit root container.
//! Folders never nest. Both carry an `order` rank that is only meaningful
//! among siblings of the same container.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Icon given to items created without one
pub const DEFAULT_ICON: &str = "📄";

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Server-issued item identifier
    ItemId
);
opaque_id!(
    /// Server-issued folder identifier
    FolderId
);

/// Deserialize an `Option` that must be present on the wire (null allowed)
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Distinguish an absent field (`None`) from an explicit null (`Some(None)`)
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Ordering scope of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Container {
    Root,
    Folder(FolderId),
}

impl Container {
    pub fn of(folder_id: Option<&FolderId>) -> Self {
        folder_id.map_or(Self::Root, |id| Self::Folder(id.clone()))
    }

    pub const fn folder_id(&self) -> Option<&FolderId> {
        match self {
            Self::Root => None,
            Self::Folder(id) => Some(id),
        }
    }

    pub fn into_folder_id(self) -> Option<FolderId> {
        match self {
            Self::Root => None,
            Self::Folder(id) => Some(id),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Folder(id) => write!(f, "folder:{id}"),
        }
    }
}

/// A card on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub icon: String,
    /// `None` means the item is loose (root container)
    #[serde(deserialize_with = "nullable")]
    pub folder_id: Option<FolderId>,
    pub order: i64,
}

impl Item {
    pub fn container(&self) -> Container {
        Container::of(self.folder_id.as_ref())
    }

    pub const fn is_loose(&self) -> bool {
        self.folder_id.is_none()
    }

    /// Merge a partial update, field by field
    pub fn apply_changes(&mut self, changes: &ItemChanges) {
        if let Some(title) = &changes.title {
            self.title.clone_from(title);
        }
        if let Some(icon) = &changes.icon {
            self.icon.clone_from(icon);
        }
        if let Some(folder_id) = &changes.folder_id {
            self.folder_id.clone_from(folder_id);
        }
        if let Some(order) = changes.order {
            self.order = order;
        }
    }
}

/// A single-level group of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub is_open: bool,
    pub order: i64,
}

impl Folder {
    pub fn apply_changes(&mut self, changes: &FolderChanges) {
        if let Some(name) = &changes.name {
            self.name.clone_from(name);
        }
        if let Some(is_open) = changes.is_open {
            self.is_open = is_open;
        }
        if let Some(order) = changes.order {
            self.order = order;
        }
    }
}

/// Fields accepted when creating an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
    /// Omitted means "append after the last sibling"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl NewItem {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub const fn at_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// Fields accepted when creating a folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFolder {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl NewFolder {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
        }
    }
}

/// Partial item update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// `Some(None)` moves the item to root
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub folder_id: Option<Option<FolderId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl ItemChanges {
    pub fn placement(order: i64, folder_id: Option<FolderId>) -> Self {
        Self {
            folder_id: Some(folder_id),
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.icon.is_none() && self.folder_id.is_none() && self.order.is_none()
    }
}

/// Partial folder update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl FolderChanges {
    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.is_open.is_none() && self.order.is_none()
    }
}

/// Acknowledgement returned by deletes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

impl Deleted {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deleted: true,
        }
    }
}

/// One row of a full snapshot, tagged with its entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotRecord {
    Item(Item),
    Folder(Folder),
}

impl SnapshotRecord {
    pub const fn order(&self) -> i64 {
        match self {
            Self::Item(item) => item.order,
            Self::Folder(folder) => folder.order,
        }
    }

    /// Split a snapshot into its items and folders
    pub fn partition(records: Vec<Self>) -> (Vec<Item>, Vec<Folder>) {
        let mut items = Vec::new();
        let mut folders = Vec::new();
        for record in records {
            match record {
                Self::Item(item) => items.push(item),
                Self::Folder(folder) => folders.push(folder),
            }
        }
        (items, folders)
    }
}
