//! Chat view: loading, live messages, unread counts and teardown

#[macro_use]
mod common;

use common::*;
use neighborly_sync::{ChatView, SyncConfig, ViewContext};
use neighborly_types::error::Error;
use neighborly_types::identity::Identity;
use neighborly_types::model::SessionStatus;
use neighborly_types::store_adapter::Table;
use std::sync::Arc;
use std::time::Duration;

async fn seed_chat(store: &neighborly_store_adapter_redb::StoreAdapterRedb) {
	seed_post(store, "P1", "owner", "c1", 10).await;
	seed_response(store, "R1", "P1", "helper", "offer_help", 11).await;
	seed_session(store, "S1", "R1", "owner", "helper", 12).await;
}

fn message_ids(view: &ChatView) -> Vec<&str> {
	view.messages().iter().map(|m| m.id.as_ref()).collect()
}

#[tokio::test]
async fn test_mount_loads_latest_messages_in_order() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;
	for (i, at) in [(1, 30), (2, 10), (3, 20), (4, 40)] {
		seed_message(&store, &format!("m{}", i), "S1", "helper", at, false).await;
	}

	let ctx =
		ViewContext::new(store.clone(), store.clone(), SyncConfig::default().with_message_limit(3));
	let mut view = ChatView::new(ctx, "S1", Identity::user("owner"));
	view.mount().await.expect("mount");
	assert!(view.is_live());
	assert_eq!(message_ids(&view), vec!["m3", "m1", "m4"]);
	assert_eq!(view.latest_message().map(|m| m.id.as_ref()), Some("m4"));
	assert_eq!(view.session().map(|s| s.helper_id.as_ref()), Some("helper"));
}

#[tokio::test]
async fn test_mount_rejects_outsiders() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;

	let mut view = ChatView::new(view_context(&store), "S1", Identity::user("stranger"));
	assert!(matches!(view.mount().await, Err(Error::PermissionDenied)));
	assert!(view.teardown_handle().is_torn_down());

	let mut view = ChatView::new(view_context(&store), "nope", Identity::user("owner"));
	assert!(matches!(view.mount().await, Err(Error::NotFound)));

	let mut view = ChatView::new(view_context(&store), "S1", Identity::anonymous());
	assert!(matches!(view.mount().await, Err(Error::Unauthenticated)));
}

#[tokio::test]
async fn test_sent_message_arrives_through_the_feed() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;
	let owner = Identity::user("owner");

	let mut view = ChatView::new(view_context(&store), "S1", owner.clone());
	view.mount().await.expect("mount");
	assert!(view.messages().is_empty());

	let sent = gateway(&store).send_message(&owner, "S1", "  On my way  ").await.expect("send");
	assert_eq!(sent.body.as_ref(), "On my way");

	wait_until!(view, view.messages().len() == 1);
	assert_eq!(view.messages()[0].id, sent.id);
	// own messages are never unread
	assert_eq!(view.unread_count(), 0);
	// session row follows too
	wait_until!(view, view.session().is_some_and(|s| s.updated_at == sent.created_at));
}

#[tokio::test]
async fn test_unread_drops_after_mark_read() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;
	seed_message(&store, "m1", "S1", "helper", 20, false).await;
	seed_message(&store, "m2", "S1", "helper", 21, false).await;
	seed_message(&store, "m3", "S1", "owner", 22, false).await;
	let owner = Identity::user("owner");

	let mut view = ChatView::new(view_context(&store), "S1", owner.clone());
	view.mount().await.expect("mount");
	assert_eq!(view.unread_count(), 2);

	let marked = gateway(&store).mark_messages_read(&owner, "S1").await.expect("mark read");
	assert_eq!(marked, 2);
	wait_until!(view, view.unread_count() == 0);
	// the helper still has the owner's message unread
	let helper_view_count = {
		let mut helper_view = ChatView::new(view_context(&store), "S1", Identity::user("helper"));
		helper_view.mount().await.expect("mount");
		helper_view.unread_count()
	};
	assert_eq!(helper_view_count, 1);
}

#[tokio::test]
async fn test_status_change_is_reflected() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;
	let helper = Identity::user("helper");

	let mut view = ChatView::new(view_context(&store), "S1", helper.clone());
	view.mount().await.expect("mount");

	gateway(&store)
		.update_session_status(&helper, "S1", SessionStatus::Completed)
		.await
		.expect("complete");
	wait_until!(view, view.session().is_some_and(|s| s.status == SessionStatus::Completed));

	let res = gateway(&store).send_message(&helper, "S1", "one more thing").await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_teardown_during_send_discards_echo() {
	let (store, _temp) = create_test_store().await;
	seed_chat(&store).await;
	let owner = Identity::user("owner");

	let mut view = ChatView::new(view_context(&store), "S1", owner.clone());
	view.mount().await.expect("mount");
	let handle = view.teardown_handle();

	let gw = gateway(&store);
	let send = tokio::spawn(async move { gw.send_message(&owner, "S1", "hello").await });
	handle.teardown();
	send.await.expect("join").expect("the write itself succeeds");

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(view.process_pending().await, 0);
	assert!(!view.next_change().await);
	assert!(view.messages().is_empty());
}

#[tokio::test]
async fn test_failed_session_read_releases_channels() {
	let (redb, _temp) = create_test_store().await;
	seed_chat(&redb).await;
	let store = Arc::new(HookedStore::new(redb.clone(), Table::ChatMessages));
	store.fail_get();
	let ctx = ViewContext::new(store.clone(), redb.clone(), SyncConfig::default());

	let mut view = ChatView::new(ctx, "S1", Identity::user("owner"));
	assert!(matches!(view.mount().await, Err(Error::Internal(_))));
	assert!(view.teardown_handle().is_torn_down());
	assert!(!view.is_live());
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(redb.subscriber_count(), 0);
}

#[tokio::test]
async fn test_teardown_during_message_load_discards_snapshot() {
	let (redb, _temp) = create_test_store().await;
	seed_chat(&redb).await;
	seed_message(&redb, "m1", "S1", "helper", 20, false).await;
	let store = Arc::new(HookedStore::new(redb.clone(), Table::ChatMessages));
	let ctx = ViewContext::new(store.clone(), redb.clone(), SyncConfig::default());

	let mut view = ChatView::new(ctx, "S1", Identity::user("owner"));
	store.teardown_on_read(view.teardown_handle());
	view.mount().await.expect("mount");

	assert!(view.session().is_none());
	assert!(view.messages().is_empty());
	assert_eq!(view.unread_count(), 0);
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(redb.subscriber_count(), 0);
}
