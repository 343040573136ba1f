//! Cache policies for delivery reads.
//!
//! This module provides:
//! - Cache key derivation from a request's logical identity
//! - The [`PersistenceStore`] seam plus SQLite, in-memory and no-op stores
//! - The [`CachePolicyEngine`], which orders store and network access per
//!   [`CachePolicy`] and settles each request exactly once

mod engine;
mod key;
mod memory;
mod response;
mod storage;

pub use engine::{CacheOptions, CachePolicy, CachePolicyEngine, DEFAULT_MAX_AGE};
pub use key::{entry_uid_from_path, CacheKey};
pub use memory::MemoryStore;
pub use response::{Response, ResponseSource};
pub use storage::{NoopStore, PersistenceStore, SqliteStore, GLOBAL_SCOPE};
