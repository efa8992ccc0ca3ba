//! Integration tests for the redb store adapter

use futures::StreamExt;
use neighborly_store_adapter_redb::{AdapterConfig, StoreAdapterRedb};
use neighborly_types::error::Error;
use neighborly_types::store_adapter::*;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_adapter() -> (StoreAdapterRedb, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let adapter = StoreAdapterRedb::new(temp_dir.path().to_path_buf(), AdapterConfig::default())
		.await
		.expect("Failed to create adapter");
	(adapter, temp_dir)
}

async fn next_event(stream: &mut ChangeStream) -> ChangeEvent {
	tokio::time::timeout(Duration::from_secs(2), stream.next())
		.await
		.expect("timed out waiting for event")
		.expect("stream ended")
}

#[tokio::test]
async fn test_insert_and_get() {
	let (adapter, _temp) = create_test_adapter().await;

	let row = adapter
		.insert(Table::Posts, json!({"id": "p1", "title": "Ladder", "cluster_id": "c1"}))
		.await
		.expect("insert");
	assert_eq!(row["id"], "p1");

	let loaded = adapter.get(Table::Posts, "p1").await.expect("get").expect("row exists");
	assert_eq!(loaded["title"], "Ladder");

	assert!(adapter.get(Table::Posts, "missing").await.expect("get").is_none());
	// same id in another table is a different row
	assert!(adapter.get(Table::PostResponses, "p1").await.expect("get").is_none());
}

#[tokio::test]
async fn test_insert_generates_id() {
	let (adapter, _temp) = create_test_adapter().await;

	let row = adapter.insert(Table::ChatMessages, json!({"body": "hi"})).await.expect("insert");
	let id = row["id"].as_str().expect("generated id");
	assert!(!id.is_empty());
	assert!(adapter.get(Table::ChatMessages, id).await.expect("get").is_some());
}

#[tokio::test]
async fn test_insert_duplicate_id_conflicts() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.insert(Table::Posts, json!({"id": "p1"})).await.expect("insert");
	let res = adapter.insert(Table::Posts, json!({"id": "p1"})).await;
	assert!(matches!(res, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn test_query_filter_sort_limit() {
	let (adapter, _temp) = create_test_adapter().await;

	for (id, cluster, created_at) in
		[("p1", "c1", 10), ("p2", "c1", 5), ("p3", "c2", 30), ("p4", "c1", 20)]
	{
		adapter
			.insert(Table::Posts, json!({"id": id, "cluster_id": cluster, "created_at": created_at}))
			.await
			.expect("insert");
	}

	let rows = adapter
		.query(
			Table::Posts,
			QueryOptions::new()
				.with_filter(QueryFilter::equals_one("cluster_id", json!("c1")))
				.with_sort(vec![SortField::desc("created_at")])
				.with_limit(2),
		)
		.await
		.expect("query");
	let ids: Vec<_> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
	assert_eq!(ids, vec!["p4", "p1"]);

	let all = adapter.query(Table::Posts, QueryOptions::new()).await.expect("query");
	assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_update_merges_and_reports_old_row() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter
		.insert(Table::Posts, json!({"id": "p1", "title": "old", "is_active": true}))
		.await
		.expect("insert");

	let mut stream =
		adapter.subscribe(SubscriptionOptions::all(Table::Posts)).await.expect("subscribe");

	let updated =
		adapter.update(Table::Posts, "p1", json!({"title": "new"})).await.expect("update");
	assert_eq!(updated["title"], "new");
	assert_eq!(updated["is_active"], true);

	match next_event(&mut stream).await {
		ChangeEvent::Update { id, data, old_data, .. } => {
			assert_eq!(id.as_ref(), "p1");
			assert_eq!(data["title"], "new");
			assert_eq!(old_data.expect("old row")["title"], "old");
		}
		other => panic!("unexpected event: {:?}", other),
	}

	let res = adapter.update(Table::Posts, "missing", json!({"title": "x"})).await;
	assert!(matches!(res, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_delete_emits_old_row() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter
		.insert(Table::PostResponses, json!({"id": "r1", "post_id": "p1"}))
		.await
		.expect("insert");

	let mut stream = adapter
		.subscribe(SubscriptionOptions::filtered(
			Table::PostResponses,
			FeedFilter::column_eq("post_id", "p1"),
		))
		.await
		.expect("subscribe");

	adapter.delete(Table::PostResponses, "r1").await.expect("delete");
	assert!(adapter.get(Table::PostResponses, "r1").await.expect("get").is_none());

	match next_event(&mut stream).await {
		ChangeEvent::Delete { id, old_data, .. } => {
			assert_eq!(id.as_ref(), "r1");
			assert_eq!(old_data.expect("old row")["post_id"], "p1");
		}
		other => panic!("unexpected event: {:?}", other),
	}

	assert!(matches!(adapter.delete(Table::PostResponses, "r1").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_subscription_filters_and_orders_events() {
	let (adapter, _temp) = create_test_adapter().await;

	let mut stream = adapter
		.subscribe(SubscriptionOptions::filtered(Table::Posts, FeedFilter::column_eq("cluster_id", "c1")))
		.await
		.expect("subscribe");

	adapter.insert(Table::Posts, json!({"id": "a", "cluster_id": "c1"})).await.expect("insert");
	adapter.insert(Table::Posts, json!({"id": "b", "cluster_id": "c2"})).await.expect("insert");
	adapter.insert(Table::Users, json!({"id": "u1", "cluster_id": "c1"})).await.expect("insert");
	adapter.insert(Table::Posts, json!({"id": "c", "cluster_id": "c1"})).await.expect("insert");

	assert_eq!(next_event(&mut stream).await.id(), "a");
	assert_eq!(next_event(&mut stream).await.id(), "c");
}

#[tokio::test]
async fn test_dropping_stream_unsubscribes() {
	let (adapter, _temp) = create_test_adapter().await;

	let stream = adapter.subscribe(SubscriptionOptions::all(Table::Posts)).await.expect("subscribe");
	assert_eq!(adapter.subscriber_count(), 1);
	drop(stream);
	assert_eq!(adapter.subscriber_count(), 0);
}

#[tokio::test]
async fn test_lagged_subscription_ends_stream() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let config = AdapterConfig { broadcast_capacity: 1, ..AdapterConfig::default() };
	let adapter = StoreAdapterRedb::new(temp_dir.path().to_path_buf(), config)
		.await
		.expect("Failed to create adapter");

	let mut stream = adapter.subscribe(SubscriptionOptions::all(Table::Posts)).await.expect("subscribe");
	// nobody reads while three commits go through a one-slot buffer
	for id in ["a", "b", "c"] {
		adapter.insert(Table::Posts, json!({"id": id, "cluster_id": "c1"})).await.expect("insert");
	}

	let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
		.await
		.expect("timed out waiting for the stream");
	assert!(next.is_none(), "a lagged stream must end instead of skipping events");
	drop(stream);
	assert_eq!(adapter.subscriber_count(), 0);
}

#[tokio::test]
async fn test_reopen_keeps_rows() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	{
		let adapter = StoreAdapterRedb::new(temp_dir.path().to_path_buf(), AdapterConfig::default())
			.await
			.expect("Failed to create adapter");
		adapter.insert(Table::Clusters, json!({"id": "c1", "postcode": "SW1A1AA"})).await.expect("insert");
	}

	let adapter = StoreAdapterRedb::new(temp_dir.path().to_path_buf(), AdapterConfig::default())
		.await
		.expect("Failed to reopen adapter");
	let row = adapter.get(Table::Clusters, "c1").await.expect("get").expect("row survives");
	assert_eq!(row["postcode"], "SW1A1AA");
}
