//! # EmberDB Storage
//!
//! Low-level storage backends for EmberDB.
//!
//! Backends are **opaque byte stores** addressed by offset. They provide
//! positional reads and writes, length management (preallocation and
//! truncation), and durability barriers. EmberDB owns all file format
//! interpretation - backends do not understand WAL records or segments.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
