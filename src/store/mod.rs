pub mod base;
pub mod memory_store;
pub mod postgrest_store;

// Re-export the primary Store items so code outside can do
// "use crate::store::{Store, create_store};"
pub use base::{create_store, Operation, Store};
pub use memory_store::MemoryStore;
