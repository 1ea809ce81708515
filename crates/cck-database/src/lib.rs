pub mod backend;
pub mod conditions;
pub mod engine;
pub mod fs;
pub mod key_index;
pub mod memory;
pub mod postprocess;

pub use backend::{DocumentBackend, StoredItem};
pub use engine::{DatabaseEngine, FsDatabaseService, InMemoryDatabaseService};
pub use fs::FsDocumentBackend;
pub use key_index::{TableKeyIndex, TABLE_KEY_SCOPE};
pub use memory::MemoryDocumentBackend;
