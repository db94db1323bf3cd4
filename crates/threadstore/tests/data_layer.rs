//! End-to-end data-layer tests against the in-memory store backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use threadstore::data_layer::expressions::UpdatePlan;
use threadstore::store::{ItemKey, QueryPage, QueryRequest, RawItem, WriteRequest};
use threadstore::{DataLayer, InMemoryStore, StoreClient};
use threadstore_core::conversation::{Element, Feedback, Metadata, Step, ThreadUpdate, User};
use threadstore_core::storage::{
    BlobStorageClient, DataLayerError, Pagination, Result, ThreadFilter, UploadedFile,
};

use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// Test doubles
// ============================================================================

/// Blob storage double with switchable failure modes.
#[derive(Default)]
struct FakeBlobStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FakeBlobStorage {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn has_blob(&self, object_key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(object_key)
    }

    fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStorageClient for FakeBlobStorage {
    async fn upload_file(
        &self,
        object_key: &str,
        data: &[u8],
        _mime: &str,
    ) -> Option<UploadedFile> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return None;
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(object_key.to_string(), data.to_vec());
        Some(UploadedFile {
            object_key: object_key.to_string(),
            url: format!("https://blobs.test/{object_key}?signed"),
        })
    }

    async fn delete_file(&self, object_key: &str) -> bool {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return false;
        }
        self.blobs.lock().unwrap().remove(object_key);
        true
    }

    async fn get_read_url(&self, object_key: &str) -> String {
        format!("https://blobs.test/{object_key}?refreshed")
    }
}

/// Store double whose item deletes always fail. Everything else delegates to
/// the in-memory backend.
struct DeleteRejectingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl StoreClient for DeleteRejectingStore {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<RawItem>> {
        self.inner.get_item(key).await
    }

    async fn put_item(&self, item: RawItem) -> Result<()> {
        self.inner.put_item(item).await
    }

    async fn update_item(&self, key: &ItemKey, plan: UpdatePlan) -> Result<()> {
        self.inner.update_item(key, plan).await
    }

    async fn delete_item(&self, _key: &ItemKey) -> Result<()> {
        Err(DataLayerError::StoreUnavailable(
            "delete rejected".to_string(),
        ))
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        self.inner.query(request).await
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        self.inner.batch_write(requests).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn layer() -> DataLayer<InMemoryStore> {
    DataLayer::new(InMemoryStore::new())
}

fn layer_with_blobs() -> (DataLayer<InMemoryStore>, Arc<FakeBlobStorage>) {
    let blobs = FakeBlobStorage::new();
    let layer = DataLayer::new(InMemoryStore::new()).with_storage_provider(blobs.clone());
    (layer, blobs)
}

fn owned_thread(user_id: &str, name: &str) -> ThreadUpdate {
    ThreadUpdate {
        name: Some(name.to_string()),
        user_id: Some(user_id.to_string()),
        ..Default::default()
    }
}

fn element(thread_id: &str, element_id: &str) -> Element {
    Element {
        id: element_id.to_string(),
        thread_id: thread_id.to_string(),
        for_id: Some("s1".to_string()),
        element_type: "file".to_string(),
        name: "report.pdf".to_string(),
        mime: Some("application/pdf".to_string()),
        url: None,
        object_key: None,
    }
}

/// Creates threads in order with strictly increasing creation times.
async fn seed_threads(layer: &DataLayer<InMemoryStore>, user_id: &str, names: &[(&str, &str)]) {
    for &(thread_id, name) in names {
        layer
            .update_thread(thread_id, &owned_thread(user_id, name))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_get_absent_user_is_none() {
    let layer = layer();
    assert_eq!(layer.get_user("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn test_create_user_round_trip() {
    let layer = layer();
    let mut metadata = Metadata::new();
    metadata.insert("role".to_string(), serde_json::json!("admin"));

    let created = layer
        .create_user(&User::new("alice").with_metadata(metadata.clone()))
        .await
        .unwrap();
    let fetched = layer.get_user("alice").await.unwrap().unwrap();

    assert_eq!(fetched, created);
    assert_eq!(fetched.identifier, "alice");
    assert_eq!(fetched.metadata, metadata);
}

#[tokio::test]
async fn test_create_user_is_idempotent() {
    let layer = layer();

    let first = layer.create_user(&User::new("alice")).await.unwrap();
    let second = layer.create_user(&User::new("alice")).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
}

// ============================================================================
// Threads
// ============================================================================

#[tokio::test]
async fn test_get_absent_thread_is_none() {
    let layer = layer();
    assert_eq!(layer.get_thread("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_update_thread_creates_and_merges() {
    let layer = layer();

    layer
        .update_thread("t1", &owned_thread("u1", "Support chat"))
        .await
        .unwrap();
    // A later sparse update must not clobber fields it does not supply.
    layer
        .update_thread(
            "t1",
            &ThreadUpdate {
                tags: Some(vec!["urgent".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    assert_eq!(thread.name.as_deref(), Some("Support chat"));
    assert_eq!(thread.user_id.as_deref(), Some("u1"));
    assert_eq!(thread.tags, vec!["urgent".to_string()]);
    assert!(thread.steps.is_empty());
}

#[tokio::test]
async fn test_get_thread_author() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();

    assert_eq!(layer.get_thread_author("t1").await.unwrap(), "u1");
    assert!(matches!(
        layer.get_thread_author("missing").await,
        Err(DataLayerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_get_thread_orders_steps_chronologically() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();

    let now = Utc::now();
    let earlier = now - chrono::Duration::seconds(60);
    // Written newest-first; read back must come out oldest-first.
    layer
        .create_step(&Step::new("s2", "t1", "assistant_message", now))
        .await
        .unwrap();
    layer
        .create_step(&Step::new("s1", "t1", "user_message", earlier))
        .await
        .unwrap();

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    let ids: Vec<&str> = thread.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn test_delete_thread_removes_steps_elements_and_blobs() {
    let store = InMemoryStore::new();
    let blobs = FakeBlobStorage::new();
    let layer = DataLayer::new(store.clone()).with_storage_provider(blobs.clone());
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();
    layer
        .create_step(&Step::new("s1", "t1", "user_message", Utc::now()))
        .await
        .unwrap();
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();
    assert_eq!(store.len().await, 3);
    assert_eq!(blobs.blob_count(), 1);

    layer.delete_thread("t1").await.unwrap();

    assert_eq!(layer.get_thread("t1").await.unwrap(), None);
    assert_eq!(layer.get_element("t1", "e1").await.unwrap(), None);
    assert!(store.is_empty().await);
    assert_eq!(blobs.blob_count(), 0);
}

#[tokio::test]
async fn test_delete_absent_thread_is_not_an_error() {
    let layer = layer();
    assert!(layer.delete_thread("missing").await.is_ok());
}

// ============================================================================
// Thread listing
// ============================================================================

#[tokio::test]
async fn test_list_threads_requires_a_user_filter() {
    let layer = layer();
    let result = layer
        .list_threads(&Pagination::first(10), &ThreadFilter::default())
        .await;
    assert!(matches!(result, Err(DataLayerError::InvalidData(_))));
}

#[tokio::test]
async fn test_list_threads_newest_first_with_continuation() {
    let layer = layer();
    seed_threads(
        &layer,
        "u1",
        &[
            ("t1", "first"),
            ("t2", "second"),
            ("t3", "third"),
            ("t4", "fourth"),
            ("t5", "fifth"),
        ],
    )
    .await;
    let filters = ThreadFilter {
        user_id: Some("u1".to_string()),
        search: None,
    };

    let page1 = layer
        .list_threads(&Pagination::first(2), &filters)
        .await
        .unwrap();
    let ids1: Vec<&str> = page1.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids1, vec!["t5", "t4"]);
    assert!(page1.page_info.has_next_page);
    let cursor1 = page1.page_info.end_cursor.unwrap();

    let page2 = layer
        .list_threads(&Pagination::after(2, cursor1), &filters)
        .await
        .unwrap();
    let ids2: Vec<&str> = page2.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids2, vec!["t3", "t2"]);
    assert!(page2.page_info.has_next_page);
    let cursor2 = page2.page_info.end_cursor.unwrap();

    let page3 = layer
        .list_threads(&Pagination::after(2, cursor2), &filters)
        .await
        .unwrap();
    let ids3: Vec<&str> = page3.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids3, vec!["t1"]);
    assert!(!page3.page_info.has_next_page);
    assert!(page3.page_info.end_cursor.is_none());
}

#[tokio::test]
async fn test_list_threads_scopes_to_the_requested_user() {
    let layer = layer();
    seed_threads(&layer, "u1", &[("t1", "mine")]).await;
    seed_threads(&layer, "u2", &[("t2", "theirs")]).await;

    let page = layer
        .list_threads(
            &Pagination::first(10),
            &ThreadFilter {
                user_id: Some("u1".to_string()),
                search: None,
            },
        )
        .await
        .unwrap();

    let ids: Vec<&str> = page.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1"]);
}

#[tokio::test]
async fn test_list_threads_search_shrinks_the_page() {
    let layer = layer();
    seed_threads(
        &layer,
        "u1",
        &[("t1", "billing question"), ("t2", "bug report"), ("t3", "billing dispute")],
    )
    .await;

    // Window is all three threads; only the billing ones survive the filter.
    let page = layer
        .list_threads(
            &Pagination::first(10),
            &ThreadFilter {
                user_id: Some("u1".to_string()),
                search: Some("billing".to_string()),
            },
        )
        .await
        .unwrap();

    let ids: Vec<&str> = page.data.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t1"]);
    assert!(!page.page_info.has_next_page);
}

#[tokio::test]
async fn test_list_threads_zero_page_size() {
    let layer = layer();
    seed_threads(&layer, "u1", &[("t1", "chat")]).await;

    let page = layer
        .list_threads(
            &Pagination::first(0),
            &ThreadFilter {
                user_id: Some("u1".to_string()),
                search: None,
            },
        )
        .await
        .unwrap();

    assert!(page.data.is_empty());
    assert!(!page.page_info.has_next_page);
}

#[tokio::test]
async fn test_list_threads_rejects_a_tampered_cursor() {
    let layer = layer();
    seed_threads(&layer, "u1", &[("t1", "chat")]).await;

    let result = layer
        .list_threads(
            &Pagination::after(5, "not!valid!base64"),
            &ThreadFilter {
                user_id: Some("u1".to_string()),
                search: None,
            },
        )
        .await;

    assert!(matches!(result, Err(DataLayerError::InvalidCursor(_))));
}

// ============================================================================
// Steps and feedback
// ============================================================================

#[tokio::test]
async fn test_update_step_overwrites_the_item() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();

    let mut step = Step::new("s1", "t1", "user_message", Utc::now());
    step.output = Some("draft".to_string());
    layer.create_step(&step).await.unwrap();

    step.output = Some("final".to_string());
    layer.update_step(&step).await.unwrap();

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    assert_eq!(thread.steps[0].output.as_deref(), Some("final"));
}

#[tokio::test]
async fn test_delete_step_leaves_the_thread() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();
    layer
        .create_step(&Step::new("s1", "t1", "user_message", Utc::now()))
        .await
        .unwrap();

    layer.delete_step("t1", "s1").await.unwrap();

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    assert!(thread.steps.is_empty());
}

#[tokio::test]
async fn test_feedback_round_trip() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();
    let mut step = Step::new("s1", "t1", "assistant_message", Utc::now());
    step.output = Some("answer".to_string());
    layer.create_step(&step).await.unwrap();

    let handle = layer
        .upsert_feedback(&Feedback {
            for_id: "s1".to_string(),
            thread_id: "t1".to_string(),
            value: 1,
            comment: Some("helpful".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(handle, "THREAD#t1::STEP#s1");

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    let feedback = thread.steps[0].feedback.as_ref().unwrap();
    assert_eq!(feedback.value, 1);
    assert_eq!(feedback.comment.as_deref(), Some("helpful"));

    layer.delete_feedback(&handle).await.unwrap();

    // The step survives with its other attributes untouched.
    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    assert_eq!(thread.steps.len(), 1);
    assert!(thread.steps[0].feedback.is_none());
    assert_eq!(thread.steps[0].output.as_deref(), Some("answer"));
}

#[tokio::test]
async fn test_upsert_feedback_replaces_the_previous_value() {
    let layer = layer();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();
    layer
        .create_step(&Step::new("s1", "t1", "assistant_message", Utc::now()))
        .await
        .unwrap();

    for (value, comment) in [(0, None), (1, Some("better".to_string()))] {
        layer
            .upsert_feedback(&Feedback {
                for_id: "s1".to_string(),
                thread_id: "t1".to_string(),
                value,
                comment,
            })
            .await
            .unwrap();
    }

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    let feedback = thread.steps[0].feedback.as_ref().unwrap();
    assert_eq!(feedback.value, 1);
    assert_eq!(feedback.comment.as_deref(), Some("better"));
}

#[tokio::test]
async fn test_delete_feedback_rejects_a_malformed_handle() {
    let layer = layer();
    let result = layer.delete_feedback("THREAD#t1|STEP#s1").await;
    assert!(matches!(
        result,
        Err(DataLayerError::MalformedIdentifier(_))
    ));
}

// ============================================================================
// Elements
// ============================================================================

#[tokio::test]
async fn test_create_element_uploads_then_stores_metadata() {
    let (layer, blobs) = layer_with_blobs();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();

    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();

    assert!(blobs.has_blob("threads/t1/files/e1"));
    let stored = layer.get_element("t1", "e1").await.unwrap().unwrap();
    assert_eq!(stored.object_key.as_deref(), Some("threads/t1/files/e1"));
    // Read path refreshes the url from the adapter.
    assert_eq!(
        stored.url.as_deref(),
        Some("https://blobs.test/threads/t1/files/e1?refreshed")
    );
}

#[tokio::test]
async fn test_create_element_without_storage_is_skipped() {
    let layer = layer();
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();
    assert_eq!(layer.get_element("t1", "e1").await.unwrap(), None);
}

#[tokio::test]
async fn test_create_element_upload_failure_writes_nothing() {
    let (layer, blobs) = layer_with_blobs();
    blobs.fail_uploads.store(true, Ordering::Relaxed);

    let result = layer.create_element(&element("t1", "e1"), b"payload").await;

    assert!(matches!(result, Err(DataLayerError::StoreUnavailable(_))));
    assert_eq!(layer.get_element("t1", "e1").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_thread_attaches_elements() {
    let (layer, _blobs) = layer_with_blobs();
    layer
        .update_thread("t1", &owned_thread("u1", "chat"))
        .await
        .unwrap();
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();

    let thread = layer.get_thread("t1").await.unwrap().unwrap();
    assert_eq!(thread.elements.len(), 1);
    assert_eq!(thread.elements[0].id, "e1");
    assert_eq!(
        thread.elements[0].url.as_deref(),
        Some("https://blobs.test/threads/t1/files/e1?refreshed")
    );
}

#[tokio::test]
async fn test_delete_element_removes_blob_and_metadata() {
    let (layer, blobs) = layer_with_blobs();
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();

    layer.delete_element("t1", "e1").await.unwrap();

    assert!(!blobs.has_blob("threads/t1/files/e1"));
    assert_eq!(layer.get_element("t1", "e1").await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_element_blob_failure_retains_metadata() {
    let (layer, blobs) = layer_with_blobs();
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();
    blobs.fail_deletes.store(true, Ordering::Relaxed);

    let result = layer.delete_element("t1", "e1").await;

    assert!(matches!(result, Err(DataLayerError::PartialFailure(_))));
    // Metadata stays addressable so the delete can be retried.
    assert!(layer.get_element("t1", "e1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_element_metadata_failure_after_blob_removal_is_partial() {
    let blobs = FakeBlobStorage::new();
    let store = DeleteRejectingStore {
        inner: InMemoryStore::new(),
    };
    let layer = DataLayer::new(store).with_storage_provider(blobs.clone());
    layer
        .create_element(&element("t1", "e1"), b"payload")
        .await
        .unwrap();

    let result = layer.delete_element("t1", "e1").await;

    // The blob is gone but the metadata item could not be removed.
    assert!(matches!(result, Err(DataLayerError::PartialFailure(_))));
    assert!(!blobs.has_blob("threads/t1/files/e1"));
    assert!(layer.get_element("t1", "e1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_absent_element_is_not_an_error() {
    let (layer, _blobs) = layer_with_blobs();
    assert!(layer.delete_element("t1", "missing").await.is_ok());
}

// ============================================================================
// Misc
// ============================================================================

#[tokio::test]
async fn test_build_debug_url_is_empty() {
    let layer = layer();
    assert_eq!(layer.build_debug_url().await, "");
}
