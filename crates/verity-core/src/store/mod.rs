//! Storage abstraction for the analysis history.
//!
//! The [`KvStore`] trait is the only thing the history store needs from a
//! durable backend: read, write, atomically rewrite, and delete one
//! serialized partition by key. Backends (SQLite in the `verity` crate, [`memory::InMemoryKvStore`]
//! here) are injected, so the history logic never touches a process-wide
//! singleton.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! [`KvStore::update`] must be atomic with respect to every other writer of
//! the same key, including writers in other processes sharing the backend.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Read-modify-write step passed to [`KvStore::update`]. Receives the
/// current payload (if any) and returns the payload to store.
pub type PartitionUpdate<'a> = Box<dyn FnOnce(Option<String>) -> Result<String> + Send + 'a>;

/// Durable key-value backend holding one serialized partition per key.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KvStore::get) | Read the payload stored under a key |
/// | [`put`](KvStore::put) | Replace the payload stored under a key |
/// | [`update`](KvStore::update) | Atomically rewrite the payload from its current value |
/// | [`delete`](KvStore::delete) | Remove a key entirely |
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the payload for `key`, or `None` if nothing was ever stored.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous payload.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Replace the payload under `key` with `apply(current)` as one atomic
    /// step. If `apply` fails nothing is written and its error is returned.
    async fn update(&self, key: &str, apply: PartitionUpdate<'_>) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
