//! Store-client seam.
//!
//! The data layer talks to the wide-column table through the [`StoreClient`]
//! capability. Two backends implement it: [`DynamoStoreClient`] over
//! `aws-sdk-dynamodb`, and [`InMemoryStore`], a single-table emulation used
//! in tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use threadstore_core::storage::Result;

use crate::data_layer::expressions::UpdatePlan;

mod dynamo;
mod error;
mod memory;

pub use dynamo::DynamoStoreClient;
pub use memory::InMemoryStore;

/// Raw wide-column item: attribute name to attribute value.
pub type RawItem = HashMap<String, AttributeValue>;

/// Continuation point reported by the store. String attributes only.
pub type LastKey = BTreeMap<String, String>;

/// The two-part composite key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// Secondary indexes defined on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexName {
    /// Per-user thread listing, sorted by creation time.
    UserThread,
}

impl IndexName {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexName::UserThread => "UserThread",
        }
    }
}

/// Server-side filter applied within the already-limited key range.
///
/// Filtering happens after the page window is cut, so a filter can shrink a
/// page below the requested size but never broadens it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Substring match on the `name` attribute.
    NameContains(String),
}

/// A bounded range query against the table or one of its indexes.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub index: Option<IndexName>,
    /// Value for the partition key of the queried table or index.
    pub partition_value: String,
    /// Optional `begins_with` condition on the sort key (main table only).
    pub sort_prefix: Option<String>,
    pub filter: Option<QueryFilter>,
    /// True for ascending sort-key order, false for descending.
    pub scan_forward: bool,
    pub limit: Option<u32>,
    /// Exclusive resumption point from a previous page.
    pub start_key: Option<LastKey>,
}

impl QueryRequest {
    /// Creates an unbounded ascending query over one main-table partition.
    pub fn partition(partition_value: impl Into<String>) -> Self {
        Self {
            index: None,
            partition_value: partition_value.into(),
            sort_prefix: None,
            filter: None,
            scan_forward: true,
            limit: None,
            start_key: None,
        }
    }

    /// Creates a query against a secondary index.
    pub fn index(index: IndexName, partition_value: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            ..Self::partition(partition_value)
        }
    }

    pub fn descending(mut self) -> Self {
        self.scan_forward = false;
        self
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_start_key(mut self, start_key: Option<LastKey>) -> Self {
        self.start_key = start_key;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<RawItem>,
    /// Present when more results exist beyond this page.
    pub last_evaluated_key: Option<LastKey>,
}

/// A single entry in a batch write.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(RawItem),
    Delete(ItemKey),
}

/// Capability required from the underlying key-value store.
///
/// All operations are single-item or single-partition; no cross-item
/// transaction guarantee is assumed. Timeouts and retries are delegated to
/// the backing client's own request lifecycle.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<RawItem>>;

    /// Writes a full item, overwriting any existing item with the same key.
    async fn put_item(&self, item: RawItem) -> Result<()>;

    /// Applies an attribute-scoped update, creating the item if absent.
    async fn update_item(&self, key: &ItemKey, plan: UpdatePlan) -> Result<()>;

    /// Deletes an item. Deleting an absent item is not an error.
    async fn delete_item(&self, key: &ItemKey) -> Result<()>;

    async fn query(&self, request: QueryRequest) -> Result<QueryPage>;

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()>;
}
