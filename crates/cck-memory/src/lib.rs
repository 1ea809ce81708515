pub mod memory;
pub mod mutex;

pub use memory::InMemoryMemoryService;
pub use mutex::{ScopedMutex, ScopedMutexGuard};
