mod error;
mod traits;
mod types;

pub use error::{DataLayerError, Result};
pub use traits::{BlobStorageClient, UploadedFile};
pub use types::{PageInfo, PaginatedResponse, Pagination, ThreadFilter};
