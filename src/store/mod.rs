//! Store access: the paginated scan / batch-delete seam the sweep runs
//! against, plus its backends.
//!
//! [`DynamoStore`] is the production backend (feature `dynamodb`);
//! [`MemoryStore`] backs tests and local experiments.

#[cfg(feature = "dynamodb")]
mod dynamodb;
mod error;
mod memory;
mod traits;
mod types;

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoStore, DynamoStoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::StoreClient;
pub use types::{ItemKey, MAX_BATCH_SIZE, Record, ScalarValue, ScanPage, ScanToken};
