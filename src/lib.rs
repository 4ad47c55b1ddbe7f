//! Music catalog storage with referential-integrity enforcement.
//!
//! The catalog holds artists, genres, albums, songs, users, per-user song
//! ratings and song/genre tags. Every mutation goes through a
//! [`CatalogStore`] backend that enforces uniqueness, foreign-key
//! existence, rating bounds and the declared cascade/restrict delete
//! policies atomically, so the invariants hold after every committed
//! operation regardless of which backend is in use.

pub mod catalog_import;
pub mod catalog_store;
pub mod config;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{
    CatalogError, CatalogResult, CatalogStore, MemoryCatalogStore, Mutation, SqliteCatalogStore,
};
