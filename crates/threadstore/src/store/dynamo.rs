//! DynamoDB store backend.
//!
//! Implements the [`StoreClient`] capability using `aws-sdk-dynamodb`.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, PutRequest, WriteRequest as DynamoWriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::warn;

use threadstore_core::storage::{DataLayerError, Result};

use super::error::{
    map_batch_write_error, map_delete_item_error, map_get_item_error, map_put_item_error,
    map_query_error, map_update_item_error,
};
use super::{ItemKey, LastKey, QueryFilter, QueryPage, QueryRequest, RawItem, StoreClient,
    WriteRequest};
use crate::data_layer::expressions::UpdatePlan;
use crate::data_layer::keys;

/// A batch write request may carry at most this many entries.
const BATCH_WRITE_CHUNK: usize = 25;

/// DynamoDB-backed store client.
pub struct DynamoStoreClient {
    client: Client,
    table_name: String,
}

impl DynamoStoreClient {
    /// Creates a store client with the given DynamoDB client and table name.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a store client from environment configuration.
    ///
    /// Uses the AWS SDK default credential chain and reads the table name
    /// from `DYNAMODB_TABLE_NAME` (defaults to "threadstore").
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        let table_name =
            std::env::var("DYNAMODB_TABLE_NAME").unwrap_or_else(|_| "threadstore".to_string());

        Ok(Self::new(client, table_name))
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl StoreClient for DynamoStoreClient {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<RawItem>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(keys::ATTR_PK, AttributeValue::S(key.pk.clone()))
            .key(keys::ATTR_SK, AttributeValue::S(key.sk.clone()))
            .send()
            .await
            .map_err(map_get_item_error)?;

        Ok(result.item)
    }

    async fn put_item(&self, item: RawItem) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(map_put_item_error)?;

        Ok(())
    }

    async fn update_item(&self, key: &ItemKey, plan: UpdatePlan) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }

        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(keys::ATTR_PK, AttributeValue::S(key.pk.clone()))
            .key(keys::ATTR_SK, AttributeValue::S(key.sk.clone()))
            .update_expression(plan.update_expression())
            .set_expression_attribute_names(Some(plan.attribute_names()))
            .set_expression_attribute_values(plan.attribute_values())
            .send()
            .await
            .map_err(map_update_item_error)?;

        Ok(())
    }

    async fn delete_item(&self, key: &ItemKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(keys::ATTR_PK, AttributeValue::S(key.pk.clone()))
            .key(keys::ATTR_SK, AttributeValue::S(key.sk.clone()))
            .send()
            .await
            .map_err(map_delete_item_error)?;

        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
        // The index partition attribute differs from the main table's.
        let partition_attr = match request.index {
            Some(_) => keys::ATTR_USER_THREAD_PK,
            None => keys::ATTR_PK,
        };

        let mut key_condition = format!("#{partition_attr} = :pk");
        let mut builder = self
            .client
            .query()
            .table_name(&self.table_name)
            .set_index_name(request.index.map(|i| i.as_str().to_string()))
            .scan_index_forward(request.scan_forward)
            .set_limit(request.limit.map(|l| l as i32))
            .expression_attribute_names(format!("#{partition_attr}"), partition_attr)
            .expression_attribute_values(":pk", AttributeValue::S(request.partition_value));

        if let Some(prefix) = request.sort_prefix {
            key_condition.push_str(" AND begins_with(#SK, :sk_prefix)");
            builder = builder
                .expression_attribute_names("#SK", keys::ATTR_SK)
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix));
        }

        if let Some(QueryFilter::NameContains(search)) = request.filter {
            builder = builder
                .filter_expression("contains(#name, :search)")
                .expression_attribute_names("#name", "name")
                .expression_attribute_values(":search", AttributeValue::S(search));
        }

        if let Some(start_key) = request.start_key {
            let start: RawItem = start_key
                .into_iter()
                .map(|(k, v)| (k, AttributeValue::S(v)))
                .collect();
            builder = builder.set_exclusive_start_key(Some(start));
        }

        let result = builder
            .key_condition_expression(key_condition)
            .send()
            .await
            .map_err(map_query_error)?;

        let last_evaluated_key = result.last_evaluated_key.map(|key| {
            key.iter()
                .filter_map(|(k, v)| v.as_s().ok().map(|s| (k.clone(), s.clone())))
                .collect::<LastKey>()
        });

        Ok(QueryPage {
            items: result.items.unwrap_or_default(),
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        for chunk in requests.chunks(BATCH_WRITE_CHUNK) {
            let mut writes = Vec::with_capacity(chunk.len());
            for request in chunk {
                let write = match request {
                    WriteRequest::Put(item) => DynamoWriteRequest::builder()
                        .put_request(
                            PutRequest::builder()
                                .set_item(Some(item.clone()))
                                .build()
                                .map_err(|e| DataLayerError::Serialization(e.to_string()))?,
                        )
                        .build(),
                    WriteRequest::Delete(key) => DynamoWriteRequest::builder()
                        .delete_request(
                            DeleteRequest::builder()
                                .key(keys::ATTR_PK, AttributeValue::S(key.pk.clone()))
                                .key(keys::ATTR_SK, AttributeValue::S(key.sk.clone()))
                                .build()
                                .map_err(|e| DataLayerError::Serialization(e.to_string()))?,
                        )
                        .build(),
                };
                writes.push(write);
            }

            let output = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, writes)
                .send()
                .await
                .map_err(map_batch_write_error)?;

            if let Some(unprocessed) = output.unprocessed_items() {
                if !unprocessed.is_empty() {
                    warn!(
                        table = %self.table_name,
                        count = unprocessed.values().map(Vec::len).sum::<usize>(),
                        "batch write left unprocessed items"
                    );
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for DynamoStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoStoreClient")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}
