//! Persistence for learned parameters.
//!
//! This crate provides the key-value `LearningStore` interface the
//! optimization core persists through, an in-memory implementation and a
//! JSON-file reference implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{load_typed, save_typed, LearningStore, Result, StoreError};
pub use memory::MemoryStore;
pub use json_storage::JsonFileStore;
