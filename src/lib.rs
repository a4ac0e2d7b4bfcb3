//! Site Admin
//!
//! Dashboard back end for ordered site content: grid images, carousel items
//! and categories kept in a stable, user-defined order on top of a store
//! that only offers per-record writes.

pub mod analytics;
pub mod app;
pub mod cli;
pub mod config;
pub mod manager;
pub mod notify;

pub use app::{AdminApp, AppError};
pub use config::AdminConfig;
pub use manager::{CollectionState, ManagerError, PositionedCollectionManager};
pub use notify::{Notification, Notifier};
