pub mod error;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use error::StorageError;
pub use memory::MemoryReadingStore;
pub use postgres::{init_pg_pool, PgReadingStore};
pub use snapshot::{read_snapshot, write_snapshot, Snapshot};
pub use store::ReadingStore;
