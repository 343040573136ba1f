//! Delta synchronization against the change feed.

mod engine;
mod types;

pub use engine::{SyncEngine, SyncPageFetcher};
pub use types::{SyncBatch, SyncCursor, SyncEventType, SyncItem, SyncPage, SyncParams};
