//! Repository Layer
//!
//! Data access abstractions and implementations.

mod traits;
mod db;
mod sqlite_store;
mod memory_store;
mod rest_store;
mod asset_store;


pub use traits::{AssetStore, RecordStore, ReorderFailure};
pub use db::{init_db, DbState, SharedConnection};
pub use sqlite_store::SqliteRecordStore;
pub use memory_store::{MemoryRecordStore, StoreCall, StoreOp};
pub use rest_store::{RestConfig, RestRecordStore};
pub use asset_store::{LocalAssetStore, RestAssetStore};
