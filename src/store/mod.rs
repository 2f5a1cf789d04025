//! Persistence layer: profile and draft storage.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;

pub use libsql_backend::LibSqlBackend;
pub use memory::{MemoryDraftStorage, MemoryProfileStore};
