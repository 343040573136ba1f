//! Client for a hosted headless-content delivery API.
//!
//! Reads (entries, content types, assets, taxonomy queries) go through a
//! [`CachePolicy`] that decides between a local [`PersistenceStore`] and the
//! network. Delta sync drains the paginated change feed with [`Stack::sync`].

pub mod cache;
pub mod config;
pub mod error;
pub mod image;
pub mod params;
pub mod query;
pub mod region;
pub mod resource;
pub mod stack;
pub mod sync;
pub mod transport;

pub use cache::{CacheOptions, CachePolicy, PersistenceStore, Response, ResponseSource};
pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use query::Query;
pub use region::Region;
pub use stack::Stack;
pub use sync::{SyncBatch, SyncEventType, SyncParams};
