//! Sidekiq style queue depths held in a Redis-like store.

pub mod depth;
pub mod redis_store;

#[cfg(test)]
pub(crate) mod memory;

use crate::error::Result;

/// Read-only view of one store database.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Members of the set at `key`. A missing key is an empty set.
    async fn members(&self, key: &str) -> Result<Vec<String>>;

    /// Length of the list at `key`. A missing key has length zero.
    async fn list_length(&self, key: &str) -> Result<u64>;

    /// Cardinality of the sorted set at `key`. A missing key has cardinality zero.
    async fn sorted_set_cardinality(&self, key: &str) -> Result<u64>;
}

/// Establishes a [`QueueStore`] for a database index.
#[async_trait::async_trait]
pub trait QueueStoreConnector: Send + Sync {
    async fn connect(&self, db: i64) -> Result<Box<dyn QueueStore>>;
}
