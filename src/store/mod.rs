//! Persistence layer for tracked resources.
//!
//! This module contains:
//! - [`StateStore`] trait, keyed by entity kind and identity
//! - [`StoredRecord`], the persisted form of a tracked resource
//! - [`MemoryStateStore`], always available
//! - [`FileStateStore`], one JSON file per record (feature `file-storage`)

mod memory;
mod record;
mod store;

#[cfg(feature = "file-storage")]
pub mod file_backed;

pub use memory::MemoryStateStore;
pub use record::{identity_key, StoredRecord};
pub use store::StateStore;

#[cfg(feature = "file-storage")]
pub use file_backed::FileStateStore;
