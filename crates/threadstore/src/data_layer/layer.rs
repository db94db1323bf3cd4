//! The data-layer facade.
//!
//! Composes the key codec, marshaller, mutation planner, cursor codec and
//! aggregator over a [`StoreClient`] and an optional blob-storage adapter.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use threadstore_core::conversation::{
    Element, Feedback, PersistedUser, Step, Thread, ThreadUpdate, User,
};
use threadstore_core::storage::{
    BlobStorageClient, DataLayerError, PageInfo, PaginatedResponse, Pagination, Result,
    ThreadFilter,
};

use super::conversions::{
    element_to_item, feedback_to_attr, item_to_element, item_to_thread, item_to_user,
    metadata_to_attr, step_to_item, tags_to_attr, user_to_item,
};
use super::expressions::UpdatePlan;
use super::{aggregate, cursor, keys};
use crate::store::{
    IndexName, ItemKey, QueryFilter, QueryRequest, RawItem, StoreClient, WriteRequest,
};

use aws_sdk_dynamodb::types::AttributeValue;

/// Default cap on the page size of a thread listing.
const DEFAULT_USER_THREAD_LIMIT: u32 = 100;

/// The public operation set over the single-table store.
///
/// All operations are plain async I/O against the store; no in-process shared
/// mutable state, no locks held across await points. Failures are surfaced,
/// not retried.
pub struct DataLayer<S> {
    store: S,
    storage_provider: Option<Arc<dyn BlobStorageClient>>,
    user_thread_limit: u32,
}

impl<S: StoreClient> DataLayer<S> {
    /// Creates a data layer over the given store, with no blob storage.
    pub fn new(store: S) -> Self {
        Self {
            store,
            storage_provider: None,
            user_thread_limit: DEFAULT_USER_THREAD_LIMIT,
        }
    }

    /// Attaches a blob-storage adapter for element payloads.
    pub fn with_storage_provider(mut self, provider: Arc<dyn BlobStorageClient>) -> Self {
        self.storage_provider = Some(provider);
        self
    }

    /// Overrides the per-user thread listing cap.
    pub fn with_user_thread_limit(mut self, limit: u32) -> Self {
        self.user_thread_limit = limit;
        self
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Looks up a user by identifier. Absent users are `None`, not an error.
    pub async fn get_user(&self, identifier: &str) -> Result<Option<PersistedUser>> {
        let key = keys::user_key(identifier);
        match self.store.get_item(&key).await? {
            Some(item) => Ok(Some(item_to_user(&item)?)),
            None => Ok(None),
        }
    }

    /// Gets or creates a user.
    ///
    /// Idempotent: an already-existing identifier returns the persisted user
    /// rather than erroring or duplicating.
    pub async fn create_user(&self, user: &User) -> Result<PersistedUser> {
        if let Some(existing) = self.get_user(&user.identifier).await? {
            return Ok(existing);
        }

        let persisted = PersistedUser::from_user(user, Utc::now());
        debug!(identifier = %persisted.identifier, "creating user");
        self.store.put_item(user_to_item(&persisted)).await?;
        Ok(persisted)
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Returns the thread's owner reference, or `NotFound` if the thread or
    /// its owner attribute is absent.
    pub async fn get_thread_author(&self, thread_id: &str) -> Result<String> {
        let key = keys::thread_key(thread_id);
        let item = self
            .store
            .get_item(&key)
            .await?
            .ok_or_else(|| DataLayerError::NotFound {
                entity_type: "Thread",
                id: thread_id.to_string(),
            })?;

        item.get("userId")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| DataLayerError::NotFound {
                entity_type: "Thread author",
                id: thread_id.to_string(),
            })
    }

    /// Fetches a thread with its steps, feedback and elements.
    ///
    /// Returns `None` when no item exists under the thread's partition key. A
    /// thread with zero steps comes back with an empty `steps` list.
    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let items = self.collect_partition(thread_id).await?;
        let Some(mut thread) = aggregate::assemble_thread(&items)? else {
            return Ok(None);
        };

        if let Some(provider) = &self.storage_provider {
            for element in &mut thread.elements {
                if let Some(object_key) = &element.object_key {
                    element.url = Some(provider.get_read_url(object_key).await);
                }
            }
        }

        Ok(Some(thread))
    }

    /// Applies a sparse thread update, creating the thread if absent.
    ///
    /// Only supplied fields are written; unsupplied fields stay unchanged.
    /// Supplying the owner also maintains the UserThread index keys.
    pub async fn update_thread(&self, thread_id: &str, update: &ThreadUpdate) -> Result<()> {
        let now = Utc::now();

        let mut plan = UpdatePlan::new()
            .set("id", AttributeValue::S(thread_id.to_string()))
            .set("createdAt", AttributeValue::S(now.to_rfc3339()));

        if let Some(name) = &update.name {
            plan = plan.set("name", AttributeValue::S(name.clone()));
        }
        if let Some(user_id) = &update.user_id {
            plan = plan
                .set("userId", AttributeValue::S(user_id.clone()))
                .set(
                    keys::ATTR_USER_THREAD_PK,
                    AttributeValue::S(keys::user_thread_pk(user_id)),
                )
                .set(
                    keys::ATTR_USER_THREAD_SK,
                    AttributeValue::S(keys::user_thread_sk(&now)),
                );
        }
        if let Some(metadata) = &update.metadata {
            plan = plan.set("metadata", metadata_to_attr(metadata));
        }
        if let Some(tags) = &update.tags {
            plan = plan.set("tags", tags_to_attr(tags));
        }

        debug!(thread_id, "updating thread");
        self.store
            .update_item(&keys::thread_key(thread_id), plan)
            .await
    }

    /// Deletes a thread and every item sharing its partition key.
    ///
    /// Element blobs are deleted best-effort first; a blob failure is logged
    /// and does not block removing the table items.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let items = self.collect_partition(thread_id).await?;
        if items.is_empty() {
            return Ok(());
        }

        if let Some(provider) = &self.storage_provider {
            for item in &items {
                let is_element = item
                    .get(keys::ATTR_SK)
                    .and_then(|v| v.as_s().ok())
                    .is_some_and(|sk| sk.starts_with(keys::ELEMENT_PREFIX));
                if !is_element {
                    continue;
                }
                if let Some(object_key) = item.get("objectKey").and_then(|v| v.as_s().ok()) {
                    if !provider.delete_file(object_key).await {
                        warn!(thread_id, object_key, "blob delete failed during thread delete");
                    }
                }
            }
        }

        let deletes: Vec<WriteRequest> = items
            .iter()
            .filter_map(item_primary_key)
            .map(WriteRequest::Delete)
            .collect();

        debug!(thread_id, count = deletes.len(), "deleting thread items");
        self.store.batch_write(deletes).await
    }

    /// Lists a user's threads newest-first, one index query per page.
    ///
    /// The page never exceeds `first` items; the search filter is applied
    /// server-side within the limited window and may shrink the page without
    /// re-querying.
    pub async fn list_threads(
        &self,
        pagination: &Pagination,
        filters: &ThreadFilter,
    ) -> Result<PaginatedResponse<Thread>> {
        let Some(user_id) = &filters.user_id else {
            return Err(DataLayerError::InvalidData(
                "list_threads requires a user filter".to_string(),
            ));
        };

        let limit = pagination.first.min(self.user_thread_limit);
        if limit == 0 {
            return Ok(PaginatedResponse::empty());
        }

        let start_key = match &pagination.cursor {
            Some(cursor) => Some(cursor::decode_cursor(cursor)?),
            None => None,
        };

        let mut request = QueryRequest::index(IndexName::UserThread, keys::user_thread_pk(user_id))
            .descending()
            .with_limit(limit)
            .with_start_key(start_key);
        if let Some(search) = &filters.search {
            request = request.with_filter(QueryFilter::NameContains(search.clone()));
        }

        let page = self.store.query(request).await?;

        let data = page
            .items
            .iter()
            .map(item_to_thread)
            .collect::<Result<Vec<_>>>()?;

        let end_cursor = match &page.last_evaluated_key {
            Some(key) => Some(cursor::encode_cursor(key)?),
            None => None,
        };

        Ok(PaginatedResponse {
            page_info: PageInfo {
                has_next_page: page.last_evaluated_key.is_some(),
                start_cursor: pagination.cursor.clone(),
                end_cursor,
            },
            data,
        })
    }

    // ========================================================================
    // Steps
    // ========================================================================

    /// Writes a step item. An existing item with the same key is overwritten
    /// entirely, not merged.
    pub async fn create_step(&self, step: &Step) -> Result<()> {
        debug!(thread_id = %step.thread_id, step_id = %step.id, "writing step");
        self.store.put_item(step_to_item(step)).await
    }

    /// Full-item step update; same overwrite semantics as [`create_step`].
    ///
    /// [`create_step`]: Self::create_step
    pub async fn update_step(&self, step: &Step) -> Result<()> {
        self.create_step(step).await
    }

    /// Deletes a single step. Its thread is left untouched; deleting an
    /// absent step is not an error.
    pub async fn delete_step(&self, thread_id: &str, step_id: &str) -> Result<()> {
        debug!(thread_id, step_id, "deleting step");
        self.store
            .delete_item(&keys::step_key(thread_id, step_id))
            .await
    }

    // ========================================================================
    // Feedback
    // ========================================================================

    /// Sets the feedback attribute on the target step and returns the
    /// composite feedback handle.
    pub async fn upsert_feedback(&self, feedback: &Feedback) -> Result<String> {
        let key = keys::step_key(&feedback.thread_id, &feedback.for_id);
        let plan = UpdatePlan::new().set("feedback", feedback_to_attr(feedback));

        self.store.update_item(&key, plan).await?;
        Ok(keys::feedback_id(&feedback.thread_id, &feedback.for_id))
    }

    /// Removes the feedback attribute addressed by the given handle. The
    /// owning step continues to exist with all other attributes untouched.
    pub async fn delete_feedback(&self, feedback_id: &str) -> Result<()> {
        let (thread_id, step_id) = keys::parse_feedback_id(feedback_id)?;
        let plan = UpdatePlan::new().remove("feedback");

        self.store
            .update_item(&keys::step_key(&thread_id, &step_id), plan)
            .await
    }

    // ========================================================================
    // Elements
    // ========================================================================

    /// Uploads an element payload to blob storage, then writes its metadata
    /// item carrying the returned url and object key.
    ///
    /// A missing upload result is fatal to the creation: nothing is written
    /// to the table. With no adapter configured the element is skipped.
    pub async fn create_element(&self, element: &Element, data: &[u8]) -> Result<()> {
        let Some(provider) = &self.storage_provider else {
            warn!(element_id = %element.id, "no blob storage configured, skipping element");
            return Ok(());
        };

        let object_key = format!("threads/{}/files/{}", element.thread_id, element.id);
        let mime = element.mime.as_deref().unwrap_or("application/octet-stream");

        let uploaded = provider
            .upload_file(&object_key, data, mime)
            .await
            .ok_or_else(|| {
                DataLayerError::StoreUnavailable(format!("blob upload failed for {object_key}"))
            })?;

        let mut stored = element.clone();
        stored.url = Some(uploaded.url);
        stored.object_key = Some(uploaded.object_key);

        debug!(thread_id = %stored.thread_id, element_id = %stored.id, "writing element");
        self.store.put_item(element_to_item(&stored)).await
    }

    /// Fetches an element's metadata, refreshing its read url from the blob
    /// adapter when an object key is stored.
    pub async fn get_element(&self, thread_id: &str, element_id: &str) -> Result<Option<Element>> {
        let key = keys::element_key(thread_id, element_id);
        let Some(item) = self.store.get_item(&key).await? else {
            return Ok(None);
        };
        let mut element = item_to_element(&item)?;

        if let (Some(provider), Some(object_key)) = (&self.storage_provider, &element.object_key) {
            element.url = Some(provider.get_read_url(object_key).await);
        }

        Ok(Some(element))
    }

    /// Deletes an element in two phases: blob first, then metadata.
    ///
    /// A failed blob delete aborts the metadata delete so the blob is never
    /// orphaned silently; either half failing after the other succeeded
    /// surfaces as `PartialFailure` for the caller to reconcile.
    pub async fn delete_element(&self, thread_id: &str, element_id: &str) -> Result<()> {
        let key = keys::element_key(thread_id, element_id);
        let Some(item) = self.store.get_item(&key).await? else {
            return Ok(());
        };
        let element = item_to_element(&item)?;

        let mut blob_deleted = false;
        if let (Some(provider), Some(object_key)) = (&self.storage_provider, &element.object_key) {
            if !provider.delete_file(object_key).await {
                warn!(thread_id, element_id, object_key, "blob delete failed");
                return Err(DataLayerError::PartialFailure(format!(
                    "blob delete failed for {object_key}; element metadata retained"
                )));
            }
            blob_deleted = true;
        }

        match self.store.delete_item(&key).await {
            Ok(()) => Ok(()),
            Err(e) if blob_deleted => Err(DataLayerError::PartialFailure(format!(
                "blob removed but element metadata delete failed: {e}"
            ))),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Misc
    // ========================================================================

    /// No debug-UI integration is configured; pinned to an empty string.
    pub async fn build_debug_url(&self) -> String {
        String::new()
    }

    /// Collects every raw item sharing the thread's partition key, following
    /// continuation keys until the partition is exhausted.
    async fn collect_partition(&self, thread_id: &str) -> Result<Vec<RawItem>> {
        let partition = keys::thread_key(thread_id).pk;
        let mut items = Vec::new();
        let mut start_key = None;

        loop {
            let request =
                QueryRequest::partition(partition.clone()).with_start_key(start_key.take());
            let page = self.store.query(request).await?;
            items.extend(page.items);

            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }

        Ok(items)
    }
}

/// Reads the primary key attributes back out of a raw item.
fn item_primary_key(item: &RawItem) -> Option<ItemKey> {
    let pk = item.get(keys::ATTR_PK)?.as_s().ok()?;
    let sk = item.get(keys::ATTR_SK)?.as_s().ok()?;
    Some(ItemKey::new(pk.clone(), sk.clone()))
}

// Facade behavior is exercised end to end in tests/data_layer.rs against the
// in-memory store backend.

impl<S: std::fmt::Debug> std::fmt::Debug for DataLayer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("store", &self.store)
            .field("user_thread_limit", &self.user_thread_limit)
            .field(
                "storage_provider",
                &self.storage_provider.as_ref().map(|_| "dyn BlobStorageClient"),
            )
            .finish()
    }
}
