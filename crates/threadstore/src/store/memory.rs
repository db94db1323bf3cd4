//! In-memory store backend.
//!
//! A single-table emulation used in tests: sorted sort keys, UserThread index
//! ordering, limit-then-filter evaluation and continuation keys all behave
//! like the real store. Data is not persisted and is lost on drop.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio::sync::RwLock;

use threadstore_core::storage::{DataLayerError, Result};

use super::{
    IndexName, ItemKey, LastKey, QueryFilter, QueryPage, QueryRequest, RawItem, StoreClient,
    WriteRequest,
};
use crate::data_layer::expressions::UpdatePlan;
use crate::data_layer::keys;

/// In-memory single-table store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    items: Arc<RwLock<BTreeMap<(String, String), RawItem>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently stored. Test helper.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Returns true when no items are stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

fn item_key_of(item: &RawItem) -> Result<(String, String)> {
    let get = |attr: &str| {
        item.get(attr)
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                DataLayerError::InvalidData(format!("item missing key attribute {attr}"))
            })
    };
    Ok((get(keys::ATTR_PK)?, get(keys::ATTR_SK)?))
}

fn string_attr(item: &RawItem, attr: &str) -> Option<String> {
    item.get(attr)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

/// The continuation key the store would report for this item.
fn resume_key(item: &RawItem, index: Option<IndexName>) -> LastKey {
    let mut key = LastKey::new();
    for attr in [keys::ATTR_PK, keys::ATTR_SK] {
        if let Some(value) = string_attr(item, attr) {
            key.insert(attr.to_string(), value);
        }
    }
    if index.is_some() {
        for attr in [keys::ATTR_USER_THREAD_PK, keys::ATTR_USER_THREAD_SK] {
            if let Some(value) = string_attr(item, attr) {
                key.insert(attr.to_string(), value);
            }
        }
    }
    key
}

fn matches_filter(item: &RawItem, filter: &QueryFilter) -> bool {
    match filter {
        QueryFilter::NameContains(search) => string_attr(item, "name")
            .is_some_and(|name| name.contains(search.as_str())),
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<RawItem>> {
        let items = self.items.read().await;
        Ok(items.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    async fn put_item(&self, item: RawItem) -> Result<()> {
        let key = item_key_of(&item)?;
        let mut items = self.items.write().await;
        items.insert(key, item);
        Ok(())
    }

    async fn update_item(&self, key: &ItemKey, plan: UpdatePlan) -> Result<()> {
        let mut items = self.items.write().await;
        let entry = items
            .entry((key.pk.clone(), key.sk.clone()))
            .or_insert_with(|| {
                // UpdateItem creates the item when absent.
                let mut item = RawItem::new();
                item.insert(keys::ATTR_PK.to_string(), AttributeValue::S(key.pk.clone()));
                item.insert(keys::ATTR_SK.to_string(), AttributeValue::S(key.sk.clone()));
                item
            });

        for (name, value) in plan.sets() {
            entry.insert(name.clone(), value.clone());
        }
        for name in plan.removes() {
            entry.remove(name);
        }
        Ok(())
    }

    async fn delete_item(&self, key: &ItemKey) -> Result<()> {
        let mut items = self.items.write().await;
        items.remove(&(key.pk.clone(), key.sk.clone()));
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        let items = self.items.read().await;

        // Select and order the full key range for this partition.
        let mut range: Vec<RawItem> = match request.index {
            None => items
                .iter()
                .filter(|((pk, sk), _)| {
                    *pk == request.partition_value
                        && request
                            .sort_prefix
                            .as_deref()
                            .is_none_or(|prefix| sk.starts_with(prefix))
                })
                .map(|(_, item)| item.clone())
                .collect(),
            Some(IndexName::UserThread) => {
                let mut indexed: Vec<RawItem> = items
                    .values()
                    .filter(|item| {
                        string_attr(item, keys::ATTR_USER_THREAD_PK).as_deref()
                            == Some(request.partition_value.as_str())
                            && item.contains_key(keys::ATTR_USER_THREAD_SK)
                    })
                    .cloned()
                    .collect();
                indexed.sort_by_key(|item| {
                    (
                        string_attr(item, keys::ATTR_USER_THREAD_SK).unwrap_or_default(),
                        string_attr(item, keys::ATTR_PK).unwrap_or_default(),
                    )
                });
                indexed
            }
        };

        if !request.scan_forward {
            range.reverse();
        }

        if let Some(start) = &request.start_key {
            let position = range
                .iter()
                .position(|item| resume_key(item, request.index) == *start)
                .ok_or_else(|| {
                    DataLayerError::InvalidCursor("stale continuation key".to_string())
                })?;
            range.drain(..=position);
        }

        let limit = request.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let more_remaining = range.len() > limit;
        let window: Vec<RawItem> = range.into_iter().take(limit).collect();

        // The continuation key points at the last evaluated item, before any
        // filter is applied: the filter narrows the page, never the scan.
        let last_evaluated_key = if more_remaining {
            window.last().map(|item| resume_key(item, request.index))
        } else {
            None
        };

        let page_items = match &request.filter {
            Some(filter) => window
                .into_iter()
                .filter(|item| matches_filter(item, filter))
                .collect(),
            None => window,
        };

        Ok(QueryPage {
            items: page_items,
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        let mut items = self.items.write().await;
        for request in requests {
            match request {
                WriteRequest::Put(item) => {
                    let key = item_key_of(&item)?;
                    items.insert(key, item);
                }
                WriteRequest::Delete(key) => {
                    items.remove(&(key.pk, key.sk));
                }
            }
        }
        Ok(())
    }
}
