pub mod config;
pub mod errors;
pub mod storage;

pub use config::{AreaBackend, AreaConfig, StorageConfig};
pub use errors::{Result, StorageError};
pub use storage::*;
