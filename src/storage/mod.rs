// Store port: named, versioned key/response caches and their backends.

pub mod disk;
pub mod memory;
pub mod traits;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use traits::{CacheStorage, ResponseCache, StorageError};
