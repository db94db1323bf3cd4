//! Single-table conversational data layer.
//!
//! Stores users, threads, steps, feedback and element metadata in one
//! wide-column key-value table, with a `UserThread` secondary index for
//! reverse-chronological per-user thread listing. Large binary payloads live
//! in external blob storage behind the `BlobStorageClient` capability from
//! `threadstore_core`.

pub mod data_layer;
pub mod store;

pub use data_layer::DataLayer;
pub use store::{DynamoStoreClient, InMemoryStore, StoreClient};
