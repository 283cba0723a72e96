//! Durable key-value storage for transaction identifiers.
//!
//! Every backend implements [`KeyValueStore`]; the identifier engine is
//! parameterized over it, so the persistence strategy is chosen at
//! construction time:
//!
//! - [`MemoryStore`] — concurrent in-process map with per-entry expiry
//! - [`FileStore`] — JSON file of `{value, expiration}` entries, domain scoped
//! - [`LayeredStore`] — dual persistence over two backends
//! - [`CappedStore`] — caps oversized values before they reach a backend

#![warn(clippy::unwrap_used)]

pub mod file;
pub mod kv;
pub mod layered;
pub mod local;

pub use file::FileStore;
pub use kv::{KeyValueStore, StoreResult};
pub use layered::{CappedStore, LayeredStore};
pub use local::MemoryStore;
