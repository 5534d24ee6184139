use super::{QueueStore, QueueStoreConnector};
use crate::config::SidekiqConfig;
use crate::error::{LagscopeError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connects to the Sidekiq Redis, optionally locating the primary through Sentinel.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    host: String,
    port: u16,
    password: Option<String>,
    sentinel_port: u16,
    sentinel_name: Option<String>,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(config: &SidekiqConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone().filter(|p| !p.is_empty()),
            sentinel_port: config.sentinel_port,
            sentinel_name: config.sentinel_name.clone().filter(|n| !n.is_empty()),
            connect_timeout: config.connect_timeout,
        }
    }

    /// Address of the primary: asked from the Sentinel on `host:sentinel_port`
    /// when a sentinel name is configured, otherwise `host:port`.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn resolve_primary(&self) -> Result<(String, u16)> {
        let Some(name) = &self.sentinel_name else {
            return Ok((self.host.clone(), self.port));
        };

        let sentinel = redis::Client::open(ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.sentinel_port),
            redis: RedisConnectionInfo::default(),
        })?;
        let mut con = sentinel.get_multiplexed_async_connection().await?;

        let primary: Option<(String, u16)> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(name)
            .query_async(&mut con)
            .await?;

        let primary = primary.ok_or_else(|| {
            LagscopeError::Setup(format!("sentinel knows no primary named '{name}'"))
        })?;
        debug!(primary_host = %primary.0, primary_port = primary.1, "Resolved primary via sentinel");
        Ok(primary)
    }

    async fn open(&self, db: i64) -> Result<RedisQueueStore> {
        let (host, port) = self.resolve_primary().await?;
        let client = redis::Client::open(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db,
                password: self.password.clone(),
                ..Default::default()
            },
        })?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(RedisQueueStore { connection })
    }
}

#[async_trait::async_trait]
impl QueueStoreConnector for RedisConnector {
    async fn connect(&self, db: i64) -> Result<Box<dyn QueueStore>> {
        let store = tokio::time::timeout(self.connect_timeout, self.open(db))
            .await
            .map_err(|_| {
                LagscopeError::Timeout(format!(
                    "connecting to redis db {db} exceeded {:?}",
                    self.connect_timeout
                ))
            })??;
        Ok(Box::new(store))
    }
}

pub struct RedisQueueStore {
    connection: MultiplexedConnection,
}

#[async_trait::async_trait]
impl QueueStore for RedisQueueStore {
    async fn members(&self, key: &str) -> Result<Vec<String>> {
        let mut con = self.connection.clone();
        let members: Vec<String> = con.smembers(key).await?;
        Ok(members)
    }

    async fn list_length(&self, key: &str) -> Result<u64> {
        let mut con = self.connection.clone();
        let length: u64 = con.llen(key).await?;
        Ok(length)
    }

    async fn sorted_set_cardinality(&self, key: &str) -> Result<u64> {
        let mut con = self.connection.clone();
        let cardinality: u64 = con.zcard(key).await?;
        Ok(cardinality)
    }
}
