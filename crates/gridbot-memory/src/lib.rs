//! `gridbot-memory` – The Map Archive.
//!
//! Keeps explored maps across sessions in a local SQLite database so a later
//! run can pick up where an earlier one stopped.
//!
//! # Modules
//!
//! - [`map_store`] – [`MapStore`][map_store::MapStore]: named map snapshots
//!   stored as serialized [`MapGraph`][gridbot_mapping::MapGraph] blobs, with
//!   listing, loading and deletion.

pub mod map_store;

pub use map_store::{MapStore, SavedMap, StoreError};
