//! Sync channel behaviour against a live in-process host

mod common;

use common::TestHarness;
use stackboard_protocol::{
    decode_server, ClientMessage, Codec, ItemId, NewFolder, NewItem, PatchSet, ServerEvent,
    SnapshotRecord,
};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn client_count_follows_connects_and_disconnects() {
    let harness = TestHarness::start().await;
    let mut a = harness.connect().await;

    let mut b = harness.connect().await;
    assert_eq!(a.next_event().await, ServerEvent::ClientCount(2));

    b.send(&ClientMessage::RequestSnapshot).await;
    assert!(matches!(b.next_event().await, ServerEvent::Snapshot(_)));
    b.close().await;
    assert_eq!(a.next_event().await, ServerEvent::ClientCount(1));
}

#[tokio::test]
async fn snapshot_is_sent_to_requester() {
    let harness = TestHarness::start().await;
    let folder = harness
        .host
        .service
        .create_folder(NewFolder::named("Inbox"))
        .await
        .unwrap();

    let mut a = harness.connect().await;
    a.send(&ClientMessage::RequestSnapshot).await;
    assert_eq!(
        a.next_event().await,
        ServerEvent::Snapshot(vec![SnapshotRecord::Folder(folder)])
    );
}

#[tokio::test]
async fn single_entity_events_reach_everyone_including_originator() {
    let harness = TestHarness::start().await;
    let (mut a, mut b) = harness.connect_pair().await;

    a.send(&ClientMessage::CreateItem(NewItem::titled("  Plan  ")))
        .await;
    let ServerEvent::ItemCreated(created) = a.next_event().await else {
        panic!("originator should see its own create");
    };
    assert_eq!(created.title, "Plan");
    assert_eq!(b.next_event().await, ServerEvent::ItemCreated(created.clone()));

    b.send(&ClientMessage::DeleteItem {
        id: created.id.clone(),
    })
    .await;
    let deleted = ServerEvent::ItemDeleted { id: created.id };
    assert_eq!(a.next_event().await, deleted);
    assert_eq!(b.next_event().await, deleted);
}

#[tokio::test]
async fn bulk_update_is_relayed_to_everyone_but_the_issuer() {
    let harness = TestHarness::start().await;
    let (mut a, mut b) = harness.connect_pair().await;
    let service = &harness.host.service;
    let p = service.create_item(NewItem::titled("P")).await.unwrap();
    let q = service.create_item(NewItem::titled("Q")).await.unwrap();
    for _ in 0..2 {
        a.next_event().await;
        b.next_event().await;
    }

    let mut patch = PatchSet::default();
    patch.item(q.id.clone(), 0, None);
    patch.item(p.id.clone(), 1, None);
    a.send(&ClientMessage::BulkUpdate(patch.clone())).await;
    assert_eq!(b.next_event().await, ServerEvent::BulkUpdateReceived(patch));

    // The issuer's next event is the snapshot it asks for, not the relay
    a.send(&ClientMessage::RequestSnapshot).await;
    let ServerEvent::Snapshot(records) = a.next_event().await else {
        panic!("issuer must not receive its own bulk update");
    };
    let (items, _) = SnapshotRecord::partition(records);
    let order_of = |id: &ItemId| items.iter().find(|i| &i.id == id).map(|i| i.order);
    assert_eq!(order_of(&q.id), Some(0));
    assert_eq!(order_of(&p.id), Some(1));
}

#[tokio::test]
async fn errors_go_only_to_the_requester() {
    let harness = TestHarness::start().await;
    let (mut a, mut b) = harness.connect_pair().await;

    a.send(&ClientMessage::DeleteItem {
        id: ItemId::from("ghost"),
    })
    .await;
    assert!(matches!(a.next_event().await, ServerEvent::Error { .. }));

    a.send_raw(Message::Text(r#"{"event":"launch-rockets"}"#.to_string()))
        .await;
    assert!(matches!(a.next_event().await, ServerEvent::Error { .. }));

    b.send(&ClientMessage::RequestSnapshot).await;
    assert!(matches!(b.next_event().await, ServerEvent::Snapshot(_)));
}

#[tokio::test]
async fn replies_follow_the_codec_the_client_used() {
    let harness = TestHarness::start().await;
    let mut a = harness.connect().await;

    a.send_with(Codec::MsgPack, &ClientMessage::CreateFolder(NewFolder::named("Bin")))
        .await;
    let frame = a.next_frame().await.unwrap();
    assert!(matches!(frame, Message::Binary(_)));
    let (codec, event) = decode_server(&frame).unwrap().unwrap();
    assert_eq!(codec, Codec::MsgPack);
    assert!(matches!(event, ServerEvent::FolderCreated(ref f) if f.name == "Bin"));

    a.send(&ClientMessage::RequestSnapshot).await;
    assert!(matches!(a.next_frame().await, Some(Message::Text(_))));
}
