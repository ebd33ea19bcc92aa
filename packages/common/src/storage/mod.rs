mod error;
mod memory;
mod traits;

#[cfg(feature = "http-storage")]
pub mod http;

pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use traits::{StorageObject, StorageVerifier, stat_with_retry};
