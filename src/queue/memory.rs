use super::{QueueStore, QueueStoreConnector};
use crate::error::{LagscopeError, Result};
use std::collections::{HashMap, HashSet};

/// In-memory store with Redis missing-key semantics.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sets: HashMap<String, Vec<String>>,
    lists: HashMap<String, u64>,
    sorted_sets: HashMap<String, u64>,
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(mut self, key: &str, members: &[&str]) -> Self {
        self.sets.insert(
            key.to_string(),
            members.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn with_list(mut self, key: &str, length: u64) -> Self {
        self.lists.insert(key.to_string(), length);
        self
    }

    pub fn with_sorted_set(mut self, key: &str, cardinality: u64) -> Self {
        self.sorted_sets.insert(key.to_string(), cardinality);
        self
    }

    /// Every read of `key` fails.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.contains(key) {
            return Err(LagscopeError::Io(std::io::Error::other(format!(
                "read of '{key}' failed"
            ))));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl QueueStore for MemoryStore {
    async fn members(&self, key: &str) -> Result<Vec<String>> {
        self.check(key)?;
        Ok(self.sets.get(key).cloned().unwrap_or_default())
    }

    async fn list_length(&self, key: &str) -> Result<u64> {
        self.check(key)?;
        Ok(self.lists.get(key).copied().unwrap_or(0))
    }

    async fn sorted_set_cardinality(&self, key: &str) -> Result<u64> {
        self.check(key)?;
        Ok(self.sorted_sets.get(key).copied().unwrap_or(0))
    }
}

/// Connector handing out a clone of the configured store per db.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    dbs: HashMap<i64, MemoryStore>,
    unreachable: HashSet<i64>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_db(mut self, db: i64, store: MemoryStore) -> Self {
        self.dbs.insert(db, store);
        self
    }

    pub fn unreachable(mut self, db: i64) -> Self {
        self.unreachable.insert(db);
        self
    }
}

#[async_trait::async_trait]
impl QueueStoreConnector for MemoryConnector {
    async fn connect(&self, db: i64) -> Result<Box<dyn QueueStore>> {
        if self.unreachable.contains(&db) {
            return Err(LagscopeError::Setup(format!("db {db} unreachable")));
        }
        Ok(Box::new(self.dbs.get(&db).cloned().unwrap_or_default()))
    }
}
