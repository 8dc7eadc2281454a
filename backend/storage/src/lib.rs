//! Storage collaborator for finished artifacts.
//!
//! `client` is what dispatchers use to hand off results; `server` and `store`
//! provide a standalone in-memory implementation of the same HTTP contract.

pub mod client;
pub mod mime_detect;
pub mod server;
pub mod store;

pub use client::{HttpStorageClient, StorageClient, StorageError, StoredImage};
pub use server::{start_storage_server, storage_router};
pub use store::{ImageStore, UpsertOutcome};
