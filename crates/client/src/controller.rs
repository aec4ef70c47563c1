//! Optimistic board controller
//!
//! A drop runs in two phases. First the gesture is resolved and applied
//! to the store under its write guard, so the board reflects it
//! immediately. Then a spawned task persists each placement with one
//! request per entity, in order. A newer drop that touches any of the
//! same entities aborts the older task; placements the older task had not
//! covered are carried into the newer one.
//!
//! With a sync channel attached, confirmed creates and edits reach the
//! store only through its broadcasts; a late HTTP response never
//! overwrites a newer broadcast value. Without one, the response is
//! merged directly.
//!
//! A failed commit is never retried. The controller records a notice and
//! replaces local state with server truth, either through the sync
//! channel or by reloading the snapshot over HTTP.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stackboard_protocol::{
    Folder, FolderChanges, FolderId, Item, ItemChanges, ItemId, NewFolder, NewItem, PatchSet,
};
use tokio::task::{AbortHandle, JoinHandle};

use crate::api::PersistenceApi;
use crate::error::{ClientError, ClientResult};
use crate::notice::{Notice, NoticeBoard};
use crate::resolver::{resolve, Gesture};
use crate::store::SharedStore;
use crate::sync::SyncSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Failed(ClientError),
    /// Aborted by a newer overlapping drop
    Superseded,
}

/// Handle to the persistence phase of one drop
pub struct CommitHandle {
    patch: PatchSet,
    task: JoinHandle<ClientResult<()>>,
}

impl CommitHandle {
    /// Placements applied locally for this drop
    pub const fn patch(&self) -> &PatchSet {
        &self.patch
    }

    pub async fn wait(self) -> CommitOutcome {
        match self.task.await {
            Ok(Ok(())) => CommitOutcome::Committed,
            Ok(Err(e)) => CommitOutcome::Failed(e),
            Err(e) if e.is_cancelled() => CommitOutcome::Superseded,
            Err(e) => CommitOutcome::Failed(ClientError::Transport(format!(
                "commit task failed: {e}"
            ))),
        }
    }
}

struct InFlight {
    /// Everything this task was asked to persist
    patch: PatchSet,
    abort: AbortHandle,
}

pub struct BoardController {
    store: SharedStore,
    api: Arc<dyn PersistenceApi>,
    sync: Option<SyncSender>,
    notices: NoticeBoard,
    in_flight: Arc<Mutex<Vec<InFlight>>>,
}

impl BoardController {
    pub fn new(store: SharedStore, api: Arc<dyn PersistenceApi>, notices: NoticeBoard) -> Self {
        Self {
            store,
            api,
            sync: None,
            notices,
            in_flight: Arc::default(),
        }
    }

    /// Resync through the sync channel instead of HTTP
    #[must_use]
    pub fn with_sync(mut self, sync: SyncSender) -> Self {
        self.sync = Some(sync);
        self
    }

    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.list()
    }

    pub fn dismiss(&self, id: u64) -> bool {
        self.notices.dismiss(id)
    }

    fn in_flight(&self) -> MutexGuard<'_, Vec<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace local state with the server's snapshot
    pub async fn refresh(&self) -> ClientResult<()> {
        let records = self.api.snapshot().await.map_err(|e| self.report(e))?;
        self.store.write().await.load_snapshot(records);
        Ok(())
    }

    /// Resolve and optimistically apply a drop, then persist it in the background
    ///
    /// Returns `None` when the gesture changes nothing.
    pub async fn drop_entity(&self, gesture: &Gesture) -> Option<CommitHandle> {
        let patch = {
            let mut store = self.store.write().await;
            let patch = resolve(&store, gesture)?;
            store.apply_patches(&patch);
            patch
        };
        tracing::debug!(?gesture, changes = patch.len(), "Applied drop locally");

        let mut in_flight = self.in_flight();
        in_flight.retain(|f| !f.abort.is_finished());

        let mut persist_set = PatchSet::default();
        in_flight.retain(|older| {
            if !older.patch.overlaps(&patch) {
                return true;
            }
            older.abort.abort();
            tracing::debug!(changes = older.patch.len(), "Superseded in-flight commit");
            carry_over(&mut persist_set, &older.patch, &patch);
            false
        });
        persist_set.items.extend(patch.items.iter().cloned());
        persist_set.folders.extend(patch.folders.iter().cloned());

        let task = tokio::spawn(commit(
            Arc::clone(&self.api),
            persist_set.clone(),
            self.store.clone(),
            self.sync.clone(),
            self.notices.clone(),
        ));
        in_flight.push(InFlight {
            patch: persist_set,
            abort: task.abort_handle(),
        });
        drop(in_flight);

        Some(CommitHandle { patch, task })
    }

    pub async fn create_item(&self, new: NewItem) -> ClientResult<Item> {
        required("title", &new.title)?;
        if let Some(icon) = &new.icon {
            required("icon", icon)?;
        }
        if let Some(folder_id) = &new.folder_id {
            if self.store.read().await.folder(folder_id).is_none() {
                return Err(ClientError::Validation(format!("unknown folder {folder_id}")));
            }
        }

        let item = self.api.create_item(&new).await.map_err(|e| self.report(e))?;
        self.confirm_item(&item).await;
        Ok(item)
    }

    pub async fn create_folder(&self, new: NewFolder) -> ClientResult<Folder> {
        required("name", &new.name)?;
        let folder = self
            .api
            .create_folder(&new)
            .await
            .map_err(|e| self.report(e))?;
        self.confirm_folder(&folder).await;
        Ok(folder)
    }

    /// Edit title, icon or placement of an item
    pub async fn edit_item(&self, id: &ItemId, changes: ItemChanges) -> ClientResult<Item> {
        if changes.is_empty() {
            return Err(ClientError::Validation("nothing to change".to_string()));
        }
        if let Some(title) = &changes.title {
            required("title", title)?;
        }
        if let Some(icon) = &changes.icon {
            required("icon", icon)?;
        }
        if self.store.read().await.item(id).is_none() {
            return Err(ClientError::NotFound(format!("item {id}")));
        }

        let item = self
            .api
            .update_item(id, &changes)
            .await
            .map_err(|e| self.report(e))?;
        self.confirm_item(&item).await;
        Ok(item)
    }

    pub async fn rename_folder(&self, id: &FolderId, name: &str) -> ClientResult<Folder> {
        required("name", name)?;
        let changes = FolderChanges {
            name: Some(name.to_string()),
            ..FolderChanges::default()
        };
        self.update_folder(id, changes).await
    }

    /// Flip a folder between open and collapsed
    pub async fn toggle_folder(&self, id: &FolderId) -> ClientResult<Folder> {
        let is_open = self
            .store
            .read()
            .await
            .folder(id)
            .map(|f| f.is_open)
            .ok_or_else(|| ClientError::NotFound(format!("folder {id}")))?;
        let changes = FolderChanges {
            is_open: Some(!is_open),
            ..FolderChanges::default()
        };
        self.update_folder(id, changes).await
    }

    async fn update_folder(&self, id: &FolderId, changes: FolderChanges) -> ClientResult<Folder> {
        if self.store.read().await.folder(id).is_none() {
            return Err(ClientError::NotFound(format!("folder {id}")));
        }
        let folder = self
            .api
            .update_folder(id, &changes)
            .await
            .map_err(|e| self.report(e))?;
        self.confirm_folder(&folder).await;
        Ok(folder)
    }

    pub async fn delete_item(&self, id: &ItemId) -> ClientResult<()> {
        if self.store.read().await.item(id).is_none() {
            return Err(ClientError::NotFound(format!("item {id}")));
        }
        self.api.delete_item(id).await.map_err(|e| self.report(e))?;
        self.store.write().await.remove_item(id);
        Ok(())
    }

    /// Delete a folder; its items move to root
    pub async fn delete_folder(&self, id: &FolderId) -> ClientResult<()> {
        if self.store.read().await.folder(id).is_none() {
            return Err(ClientError::NotFound(format!("folder {id}")));
        }
        self.api.delete_folder(id).await.map_err(|e| self.report(e))?;
        self.store.write().await.remove_folder(id);
        Ok(())
    }

    async fn confirm_item(&self, item: &Item) {
        if self.sync.is_none() {
            self.store.write().await.upsert_item(item.clone());
        }
    }

    async fn confirm_folder(&self, folder: &Folder) {
        if self.sync.is_none() {
            self.store.write().await.upsert_folder(folder.clone());
        }
    }

    fn report(&self, err: ClientError) -> ClientError {
        if err.is_reportable() {
            self.notices.push(err.to_string());
        }
        err
    }
}

fn required(field: &str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        Err(ClientError::Validation(format!("{field} must not be blank")))
    } else {
        Ok(())
    }
}

/// Copy placements of `older` that `newer` does not override
fn carry_over(into: &mut PatchSet, older: &PatchSet, newer: &PatchSet) {
    for placement in &older.items {
        if !newer.touches_item(&placement.id) && !into.touches_item(&placement.id) {
            into.items.push(placement.clone());
        }
    }
    for placement in &older.folders {
        if !newer.touches_folder(&placement.id) && !into.touches_folder(&placement.id) {
            into.folders.push(placement.clone());
        }
    }
}

async fn commit(
    api: Arc<dyn PersistenceApi>,
    patch: PatchSet,
    store: SharedStore,
    sync: Option<SyncSender>,
    notices: NoticeBoard,
) -> ClientResult<()> {
    let result = persist(api.as_ref(), &patch).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "Commit failed, resyncing");
        notices.push(format!("Could not save the new order: {e}"));
        resync(api.as_ref(), &store, sync.as_ref()).await;
    }
    result
}

async fn persist(api: &dyn PersistenceApi, patch: &PatchSet) -> ClientResult<()> {
    for placement in &patch.items {
        let changes = ItemChanges::placement(placement.order, placement.folder_id.clone());
        api.update_item(&placement.id, &changes).await?;
    }
    for placement in &patch.folders {
        api.update_folder(&placement.id, &FolderChanges::order(placement.order))
            .await?;
    }
    Ok(())
}

async fn resync(api: &dyn PersistenceApi, store: &SharedStore, sync: Option<&SyncSender>) {
    if let Some(sync) = sync {
        if sync.request_snapshot().is_ok() {
            return;
        }
    }
    match api.snapshot().await {
        Ok(records) => store.write().await.load_snapshot(records),
        Err(e) => tracing::warn!(error = %e, "Resync failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use stackboard_protocol::{Container, SnapshotRecord};

    use super::*;
    use crate::resolver::DropTarget;
    use crate::store::fixtures::{folder, item};
    use crate::store::{shared, LocalStore};

    /// Server double backed by its own store
    #[derive(Default)]
    struct MockApi {
        server: Mutex<LocalStore>,
        calls: Mutex<Vec<String>>,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    impl MockApi {
        fn with(store: &LocalStore) -> Self {
            Self {
                server: Mutex::new(store.clone()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn call(&self, name: String) -> ClientResult<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(name);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection refused".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PersistenceApi for MockApi {
        async fn snapshot(&self) -> ClientResult<Vec<SnapshotRecord>> {
            let server = self.server.lock().unwrap();
            let mut records: Vec<_> =
                server.folders().cloned().map(SnapshotRecord::Folder).collect();
            records.extend(server.items().cloned().map(SnapshotRecord::Item));
            Ok(records)
        }

        async fn create_item(&self, new: &NewItem) -> ClientResult<Item> {
            self.call(format!("create-item:{}", new.title)).await?;
            let created = Item {
                id: ItemId::from("created"),
                title: new.title.trim().to_string(),
                icon: new.icon.clone().unwrap_or_default(),
                folder_id: new.folder_id.clone(),
                order: 0,
            };
            self.server.lock().unwrap().upsert_item(created.clone());
            Ok(created)
        }

        async fn create_folder(&self, new: &NewFolder) -> ClientResult<Folder> {
            self.call(format!("create-folder:{}", new.name)).await?;
            Ok(folder("created", 0))
        }

        async fn update_item(&self, id: &ItemId, changes: &ItemChanges) -> ClientResult<Item> {
            self.call(format!("update-item:{id}:{:?}", changes.order)).await?;
            let mut server = self.server.lock().unwrap();
            let mut item = server
                .item(id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
            item.apply_changes(changes);
            server.upsert_item(item.clone());
            Ok(item)
        }

        async fn update_folder(
            &self,
            id: &FolderId,
            changes: &FolderChanges,
        ) -> ClientResult<Folder> {
            self.call(format!("update-folder:{id}:{:?}", changes.order)).await?;
            let mut server = self.server.lock().unwrap();
            let mut folder = server
                .folder(id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
            folder.apply_changes(changes);
            server.upsert_folder(folder.clone());
            Ok(folder)
        }

        async fn delete_item(&self, id: &ItemId) -> ClientResult<()> {
            self.call(format!("delete-item:{id}")).await?;
            self.server.lock().unwrap().remove_item(id);
            Ok(())
        }

        async fn delete_folder(&self, id: &FolderId) -> ClientResult<()> {
            self.call(format!("delete-folder:{id}")).await?;
            self.server.lock().unwrap().remove_folder(id);
            Ok(())
        }
    }

    fn abc() -> LocalStore {
        let mut store = LocalStore::new();
        store.replace_all(
            [item("A", None, 0), item("B", None, 1), item("C", None, 2)],
            [folder("F", 0)],
        );
        store
    }

    fn controller(store: LocalStore, api: MockApi) -> (BoardController, Arc<MockApi>) {
        let api = Arc::new(api);
        let controller = BoardController::new(
            shared(store),
            Arc::clone(&api) as Arc<dyn PersistenceApi>,
            NoticeBoard::new(),
        );
        (controller, api)
    }

    async fn root_ids(controller: &BoardController) -> Vec<String> {
        let store = controller.store().read().await;
        store
            .items_in(&Container::Root)
            .iter()
            .map(|i| i.id.to_string())
            .collect()
    }

    #[tokio::test]
    async fn drop_is_visible_immediately_and_persisted_in_order() {
        let (controller, api) = controller(abc(), MockApi::with(&abc()));

        let handle = controller
            .drop_entity(&Gesture::item("C", DropTarget::Item("A".into())))
            .await
            .unwrap();
        assert_eq!(root_ids(&controller).await, ["C", "A", "B"]);
        assert_eq!(handle.patch().len(), 3);

        assert_eq!(handle.wait().await, CommitOutcome::Committed);
        assert_eq!(
            api.calls(),
            [
                "update-item:C:Some(0)",
                "update-item:A:Some(1)",
                "update-item:B:Some(2)"
            ]
        );
        assert!(controller.notices().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_reports_and_restores_server_state() {
        let api = MockApi::with(&abc());
        api.fail.store(true, Ordering::SeqCst);
        let (controller, _api) = controller(abc(), api);

        let handle = controller
            .drop_entity(&Gesture::item("C", DropTarget::Item("A".into())))
            .await
            .unwrap();
        assert!(matches!(
            handle.wait().await,
            CommitOutcome::Failed(ClientError::Transport(_))
        ));

        assert_eq!(root_ids(&controller).await, ["A", "B", "C"]);
        let notices = controller.notices();
        assert_eq!(notices.len(), 1);
        assert!(controller.dismiss(notices[0].id));
    }

    #[tokio::test]
    async fn overlapping_drop_supersedes_the_older_commit() {
        let api = MockApi {
            delay: Some(Duration::from_millis(50)),
            ..MockApi::with(&abc())
        };
        let (controller, api) = controller(abc(), api);

        let first = controller
            .drop_entity(&Gesture::item("C", DropTarget::Item("A".into())))
            .await
            .unwrap();
        let second = controller
            .drop_entity(&Gesture::item("B", DropTarget::Item("C".into())))
            .await
            .unwrap();

        assert_eq!(first.wait().await, CommitOutcome::Superseded);
        assert_eq!(second.wait().await, CommitOutcome::Committed);
        assert_eq!(root_ids(&controller).await, ["B", "C", "A"]);

        let server: Vec<_> = api
            .server
            .lock()
            .unwrap()
            .items_in(&Container::Root)
            .iter()
            .map(|i| (i.id.to_string(), i.order))
            .collect();
        assert_eq!(
            server,
            [("B".to_string(), 0), ("C".to_string(), 1), ("A".to_string(), 2)]
        );
    }

    #[test]
    fn superseded_placements_are_carried_forward() {
        let mut older = PatchSet::default();
        older.item(ItemId::from("A"), 1, None);
        older.item(ItemId::from("Z"), 4, None);
        let mut newer = PatchSet::default();
        newer.item(ItemId::from("A"), 0, None);

        let mut carried = PatchSet::default();
        carry_over(&mut carried, &older, &newer);
        assert_eq!(carried.items.len(), 1);
        assert_eq!(carried.items[0].id, ItemId::from("Z"));
    }

    #[tokio::test]
    async fn unresolvable_gestures_make_no_calls() {
        let (controller, api) = controller(abc(), MockApi::with(&abc()));
        let self_drop = Gesture::item("A", DropTarget::Item("A".into()));
        assert!(controller.drop_entity(&self_drop).await.is_none());
        let folder_on_item = Gesture::folder("F", DropTarget::Item("A".into()));
        assert!(controller.drop_entity(&folder_on_item).await.is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_call() {
        let (controller, api) = controller(abc(), MockApi::with(&abc()));

        let blank = controller.create_item(NewItem::titled("   ")).await;
        assert!(matches!(blank, Err(ClientError::Validation(_))));
        let orphan = controller
            .create_item(NewItem::titled("x").in_folder(FolderId::from("ghost")))
            .await;
        assert!(matches!(orphan, Err(ClientError::Validation(_))));
        let unnamed = controller.create_folder(NewFolder::named("")).await;
        assert!(matches!(unnamed, Err(ClientError::Validation(_))));
        let nothing = controller
            .edit_item(&ItemId::from("A"), ItemChanges::default())
            .await;
        assert!(matches!(nothing, Err(ClientError::Validation(_))));
        let missing = controller.delete_item(&ItemId::from("ghost")).await;
        assert!(matches!(missing, Err(ClientError::NotFound(_))));

        assert!(api.calls().is_empty());
        assert!(controller.notices().is_empty());
    }

    #[tokio::test]
    async fn confirmed_edits_land_in_the_store() {
        let (controller, _api) = controller(abc(), MockApi::with(&abc()));

        let created = controller.create_item(NewItem::titled(" Plan ")).await.unwrap();
        assert_eq!(created.title, "Plan");
        assert!(controller.store().read().await.item(&created.id).is_some());

        let folder = controller.toggle_folder(&FolderId::from("F")).await.unwrap();
        assert!(!folder.is_open);
        let renamed = controller
            .rename_folder(&FolderId::from("F"), "Later")
            .await
            .unwrap();
        assert_eq!(renamed.name, "Later");
        assert!(!renamed.is_open);
    }

    #[tokio::test]
    async fn late_response_does_not_overwrite_a_newer_broadcast() {
        let api = Arc::new(MockApi {
            delay: Some(Duration::from_millis(50)),
            ..MockApi::with(&abc())
        });
        let (outgoing, _requests) = tokio::sync::mpsc::unbounded_channel();
        let controller = BoardController::new(
            shared(abc()),
            Arc::clone(&api) as Arc<dyn PersistenceApi>,
            NoticeBoard::new(),
        )
        .with_sync(SyncSender::from_channel(outgoing));

        let edit = ItemChanges {
            title: Some("mine".to_string()),
            ..ItemChanges::default()
        };
        let newer = Item {
            title: "theirs".to_string(),
            ..item("A", None, 0)
        };
        let a_id = ItemId::from("A");
        let (edited, ()) = tokio::join!(controller.edit_item(&a_id, edit), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.store().write().await.upsert_item(newer.clone());
        });
        assert_eq!(edited.unwrap().title, "mine");

        let store = controller.store().read().await;
        assert_eq!(store.item(&ItemId::from("A")), Some(&newer));
    }

    #[tokio::test]
    async fn deleting_a_folder_releases_items_locally() {
        let mut store = abc();
        store.upsert_item(item("inner", Some("F"), 0));
        let (controller, _api) = controller(store.clone(), MockApi::with(&store));

        controller.delete_folder(&FolderId::from("F")).await.unwrap();
        assert_eq!(root_ids(&controller).await, ["A", "B", "C", "inner"]);
        assert_eq!(controller.store().read().await.folder_count(), 0);
    }

    #[tokio::test]
    async fn transport_failures_become_notices() {
        let api = MockApi::with(&abc());
        api.fail.store(true, Ordering::SeqCst);
        let (controller, _api) = controller(abc(), api);

        let result = controller.delete_item(&ItemId::from("A")).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(controller.notices().len(), 1);
        assert_eq!(controller.store().read().await.item_count(), 3);
    }
}
