pub mod memory_store;
pub mod sled_store;

pub use memory_store::InMemoryPersistence;
pub use sled_store::SledPersistence;
