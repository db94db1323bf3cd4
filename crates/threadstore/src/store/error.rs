//! AWS SDK error mapping.
//!
//! Store failures are surfaced as `StoreUnavailable`, not retried; retry and
//! backoff belong to the SDK client configuration.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use threadstore_core::storage::DataLayerError;

fn unavailable(operation: &str, detail: impl Debug) -> DataLayerError {
    DataLayerError::StoreUnavailable(format!("{operation} failed: {detail:?}"))
}

/// Map a GetItem SDK error.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        GetItemError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table not found".to_string())
        }
        GetItemError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        GetItemError::RequestLimitExceeded(_) => {
            DataLayerError::StoreUnavailable("Request limit exceeded, please retry".to_string())
        }
        err => unavailable("GetItem", err),
    }
}

/// Map a PutItem SDK error.
pub fn map_put_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<PutItemError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        PutItemError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table not found".to_string())
        }
        PutItemError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        PutItemError::ItemCollectionSizeLimitExceededException(_) => {
            DataLayerError::StoreUnavailable("Item collection size limit exceeded".to_string())
        }
        err => unavailable("PutItem", err),
    }
}

/// Map an UpdateItem SDK error.
pub fn map_update_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateItemError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        UpdateItemError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table not found".to_string())
        }
        UpdateItemError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        err => unavailable("UpdateItem", err),
    }
}

/// Map a DeleteItem SDK error.
pub fn map_delete_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteItemError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        DeleteItemError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table not found".to_string())
        }
        DeleteItemError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        err => unavailable("DeleteItem", err),
    }
}

/// Map a Query SDK error.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<QueryError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        QueryError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table or index not found".to_string())
        }
        QueryError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        err => unavailable("Query", err),
    }
}

/// Map a BatchWriteItem SDK error.
pub fn map_batch_write_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<BatchWriteItemError, R>,
) -> DataLayerError {
    match err.into_service_error() {
        BatchWriteItemError::ResourceNotFoundException(_) => {
            DataLayerError::StoreUnavailable("Table not found".to_string())
        }
        BatchWriteItemError::ProvisionedThroughputExceededException(_) => {
            DataLayerError::StoreUnavailable("Throughput exceeded, please retry".to_string())
        }
        err => unavailable("BatchWriteItem", err),
    }
}
