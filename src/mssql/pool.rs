use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::Object;

use super::query::{run_batch, run_control};
use crate::config::ConnectionConfig;
use crate::error::SqlChainError;
use crate::params::BoundParam;
use crate::pool::{Connection, ConnectionPool};
use crate::results::RecordSet;

/// `deadpool-tiberius` pool for one [`ConnectionConfig`].
pub struct MssqlPool {
    pool: deadpool_tiberius::Pool,
    server: String,
    database: String,
    acquire_timeout: Option<Duration>,
}

// Manual Debug implementation because deadpool_tiberius::Manager doesn't implement Debug
impl fmt::Debug for MssqlPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlPool")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

impl MssqlPool {
    /// Build the pool. No connection is opened until the first `acquire`.
    ///
    /// # Errors
    /// `ConfigError` if the config is invalid or the pool cannot be built.
    pub fn new(config: &ConnectionConfig) -> Result<Self, SqlChainError> {
        config.validate()?;

        let mut manager = deadpool_tiberius::Manager::new()
            .host(&config.server)
            .port(config.port)
            .basic_authentication(&config.user, &config.password)
            .database(&config.database)
            .max_size(config.max_connections);
        if let Some(instance) = &config.instance_name {
            manager = manager.instance_name(instance);
        }
        if config.trust_cert {
            manager = manager.trust_cert();
        }

        let pool = manager.create_pool().map_err(|e| {
            SqlChainError::ConfigError(format!("Failed to create SQL Server pool: {e}"))
        })?;

        Ok(Self {
            pool,
            server: config.server.clone(),
            database: config.database.clone(),
            acquire_timeout: config.acquire_timeout(),
        })
    }
}

#[async_trait]
impl ConnectionPool for MssqlPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, SqlChainError> {
        let checkout = self.pool.get();
        let object = match self.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, checkout).await.map_err(|_| {
                SqlChainError::PoolError(format!(
                    "timed out after {limit:?} waiting for a connection to {}/{}",
                    self.server, self.database
                ))
            })?,
            None => checkout.await,
        }
        .map_err(|e| SqlChainError::PoolError(format!("SQL Server pool error: {e}")))?;

        tracing::trace!(server = %self.server, database = %self.database, "leased connection");
        Ok(Box::new(MssqlConnection::new(object)))
    }
}

type PooledClient = Object<deadpool_tiberius::Manager>;

/// A leased pool object; goes back to the pool when dropped, unless it may
/// still carry an open transaction or a half-read response.
struct MssqlConnection {
    client: Option<PooledClient>,
    in_transaction: bool,
    busy: bool,
}

impl MssqlConnection {
    fn new(client: PooledClient) -> Self {
        Self {
            client: Some(client),
            in_transaction: false,
            busy: false,
        }
    }

    fn client(&mut self) -> Result<&mut PooledClient, SqlChainError> {
        self.client
            .as_mut()
            .ok_or_else(|| SqlChainError::DriverError("connection is closed".into()))
    }

    async fn control(&mut self, sql: &str) -> Result<(), SqlChainError> {
        self.busy = true;
        let outcome = run_control(&mut **self.client()?, sql).await;
        self.busy = false;
        outcome
    }

    /// Remove the client from the pool for good; dropping it closes the socket.
    fn detach(&mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
            tracing::debug!("closed connection instead of returning it to the pool");
        }
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<Vec<RecordSet>, SqlChainError> {
        self.busy = true;
        let outcome = run_batch(&mut **self.client()?, sql, params).await;
        self.busy = false;
        outcome
    }

    async fn begin_transaction(&mut self) -> Result<(), SqlChainError> {
        self.in_transaction = true;
        let outcome = self.control("BEGIN TRANSACTION").await;
        if outcome.is_err() {
            self.in_transaction = false;
        }
        outcome
    }

    async fn commit(&mut self) -> Result<(), SqlChainError> {
        self.control("COMMIT TRANSACTION").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlChainError> {
        self.control("ROLLBACK TRANSACTION").await?;
        self.in_transaction = false;
        Ok(())
    }

    fn close(mut self: Box<Self>) {
        self.detach();
    }
}

impl Drop for MssqlConnection {
    fn drop(&mut self) {
        if self.in_transaction || self.busy {
            self.detach();
        }
    }
}
