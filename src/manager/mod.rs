//! Collection managers
//!
//! Ordered collections edited from the dashboard: grid images, carousel
//! items, categories.

mod collection;
mod state;


pub use collection::{
    AssetCleanup, ManagerError, ManagerResult, MoveOutcome, PositionedCollectionManager,
};
pub use state::CollectionState;
