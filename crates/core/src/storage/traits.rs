use async_trait::async_trait;

/// Result of a successful blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub object_key: String,
    pub url: String,
}

/// Capability required from every blob-storage backend.
///
/// Failures are swallowed into empty-result sentinels at this boundary rather
/// than raised, so the data layer's write path can decide whether a missing
/// upload result is fatal to the overall entity creation.
#[async_trait]
pub trait BlobStorageClient: Send + Sync {
    /// Uploads a payload under the given object key. Returns `None` on failure.
    async fn upload_file(&self, object_key: &str, data: &[u8], mime: &str)
        -> Option<UploadedFile>;

    /// Deletes the blob under the given object key. Returns false on failure.
    async fn delete_file(&self, object_key: &str) -> bool;

    /// Returns a presigned read url for the given object key.
    ///
    /// Falls back to returning the bare key string on failure. Callers must
    /// treat a non-url-shaped return as a failure signal rather than an error.
    async fn get_read_url(&self, object_key: &str) -> String;
}
