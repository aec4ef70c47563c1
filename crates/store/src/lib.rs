pub mod backend;
pub mod memory;
pub mod sqlite;

pub use backend::{EntityBackend, StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
