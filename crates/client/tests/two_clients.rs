//! Two full clients against an in-process host

use std::sync::Arc;
use std::time::Duration;

use stackboard_client::{
    shared, BoardController, ClientConfig, ClientError, CommitOutcome, DropTarget, Gesture,
    HttpApi, LocalStore, NoticeBoard, PersistenceApi, SharedStore, SyncClient,
};
use stackboard_host::config::{BackendKind, Config};
use stackboard_host::server::open_backend;
use stackboard_host::RunningHost;
use stackboard_protocol::{Container, NewFolder, NewItem, PatchSet};

struct Peer {
    controller: BoardController,
    sync: SyncClient,
}

impl Peer {
    fn store(&self) -> &SharedStore {
        self.controller.store()
    }
}

async fn start_host() -> RunningHost {
    let mut config = Config::default();
    config.server.http_port = 0;
    config.server.ws_port = 0;
    config.storage.backend = BackendKind::Memory;
    let backend = open_backend(&config.storage).unwrap();
    RunningHost::start(&config, backend).await.unwrap()
}

fn client_config(host: &RunningHost) -> ClientConfig {
    ClientConfig::new(host.http_url(), host.ws_url())
}

async fn join(host: &RunningHost) -> Peer {
    let config = client_config(host);
    let store = shared(LocalStore::new());
    let notices = NoticeBoard::new();
    let sync = SyncClient::connect(&config, store.clone(), notices.clone());
    let api: Arc<dyn PersistenceApi> = Arc::new(HttpApi::new(config));
    let controller = BoardController::new(store, api, notices).with_sync(sync.sender());

    // The first revision is the connect-time snapshot
    let mut revisions = sync.revisions();
    tokio::time::timeout(Duration::from_secs(3), revisions.wait_for(|rev| *rev > 0))
        .await
        .expect("no snapshot after connecting")
        .unwrap();
    Peer { controller, sync }
}

/// Poll the store until `check` holds or three seconds pass
async fn wait_for(store: &SharedStore, check: impl Fn(&LocalStore) -> bool) {
    for _ in 0..150 {
        if check(&*store.read().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("store never reached the expected state");
}

fn root_titles(store: &LocalStore) -> Vec<String> {
    store
        .items_in(&Container::Root)
        .iter()
        .map(|i| i.title.clone())
        .collect()
}

#[tokio::test]
async fn drops_converge_across_clients() {
    let host = start_host().await;
    let alice = join(&host).await;
    let bob = join(&host).await;

    for title in ["A", "B", "C"] {
        alice
            .controller
            .create_item(NewItem::titled(title))
            .await
            .unwrap();
    }
    // Confirmed creates arrive through the sync channel, the issuer included
    wait_for(alice.store(), |s| root_titles(s) == ["A", "B", "C"]).await;
    wait_for(bob.store(), |s| root_titles(s) == ["A", "B", "C"]).await;

    let (c, a) = {
        let store = alice.store().read().await;
        let root = store.items_in(&Container::Root);
        (root[2].id.clone(), root[0].id.clone())
    };
    let handle = alice
        .controller
        .drop_entity(&Gesture::item(c, DropTarget::Item(a)))
        .await
        .unwrap();
    assert_eq!(root_titles(&*alice.store().read().await), ["C", "A", "B"]);
    assert_eq!(handle.wait().await, CommitOutcome::Committed);

    wait_for(bob.store(), |s| root_titles(s) == ["C", "A", "B"]).await;
    assert_eq!(bob.sync.presence().await.client_count, 2);
}

#[tokio::test]
async fn folder_delete_reaches_other_clients() {
    let host = start_host().await;
    let alice = join(&host).await;
    let bob = join(&host).await;

    alice.controller.create_item(NewItem::titled("loose")).await.unwrap();
    let folder = alice
        .controller
        .create_folder(NewFolder::named("Work"))
        .await
        .unwrap();
    wait_for(alice.store(), |s| s.folder(&folder.id).is_some()).await;
    alice
        .controller
        .create_item(NewItem::titled("inside").in_folder(folder.id.clone()))
        .await
        .unwrap();
    wait_for(bob.store(), |s| s.item_count() == 2).await;

    alice.controller.delete_folder(&folder.id).await.unwrap();
    wait_for(bob.store(), |s| {
        s.folder_count() == 0 && root_titles(s) == ["loose", "inside"]
    })
    .await;
}

#[tokio::test]
async fn bulk_updates_reach_peers_but_not_the_sender() {
    let host = start_host().await;
    let alice = join(&host).await;
    let bob = join(&host).await;

    for title in ["P", "Q"] {
        alice.controller.create_item(NewItem::titled(title)).await.unwrap();
    }
    wait_for(alice.store(), |s| root_titles(s) == ["P", "Q"]).await;
    wait_for(bob.store(), |s| s.item_count() == 2).await;

    let mut patch = PatchSet::default();
    {
        let store = alice.store().read().await;
        let root = store.items_in(&Container::Root);
        patch.item(root[1].id.clone(), 0, None);
        patch.item(root[0].id.clone(), 1, None);
    }
    alice.sync.send_bulk_update(patch).unwrap();

    wait_for(bob.store(), |s| root_titles(s) == ["Q", "P"]).await;
    // The issuer never receives its own relay, only a requested snapshot
    assert_eq!(root_titles(&*alice.store().read().await), ["P", "Q"]);
    alice.sync.request_snapshot().unwrap();
    wait_for(alice.store(), |s| root_titles(s) == ["Q", "P"]).await;
}

#[tokio::test]
async fn server_validation_errors_are_typed() {
    let host = start_host().await;
    let api = HttpApi::new(client_config(&host));

    let blank = api.create_item(&NewItem::titled("  ")).await;
    assert!(matches!(blank, Err(ClientError::Validation(_))));
    let far = api
        .create_item(&NewItem::titled("far").at_order(i64::MAX))
        .await;
    assert!(matches!(far, Err(ClientError::Validation(_))));
    // The host keeps serving after the rejection
    let next = api.create_item(&NewItem::titled("next")).await.unwrap();
    assert_eq!(next.order, 0);
    let missing = api
        .delete_folder(&stackboard_protocol::FolderId::from("ghost"))
        .await;
    assert!(matches!(missing, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let mut config = ClientConfig::new("http://127.0.0.1:9", "ws://127.0.0.1:9");
    config.request_timeout = Duration::from_secs(2);
    let api = HttpApi::new(config);
    assert!(matches!(
        api.snapshot().await,
        Err(ClientError::Transport(_))
    ));
}
