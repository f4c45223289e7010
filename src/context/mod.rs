//! Caller-facing façades that lease a connection and run a chain on it.

mod plain;
mod transaction;

use std::sync::Arc;

pub use plain::PlainContext;
pub use transaction::{TransactionContext, TransactionHandle, TransactionResults, TransactionState};

use crate::config::{ConnectionConfig, resolve_config};
use crate::error::SqlChainError;
use crate::pool::{ConnectionPool, pool_for};

/// Where a context gets its connection from. Resolved when the chain runs, so
/// a context built from the default config sees the default as of that moment.
#[derive(Clone)]
pub(crate) enum PoolSource {
    Config(ConnectionConfig),
    Default,
    Pool(Arc<dyn ConnectionPool>),
}

impl PoolSource {
    pub(crate) fn resolve(&self) -> Result<Arc<dyn ConnectionPool>, SqlChainError> {
        match self {
            PoolSource::Config(config) => pool_for(config),
            PoolSource::Default => pool_for(&resolve_config(None)?),
            PoolSource::Pool(pool) => Ok(pool.clone()),
        }
    }
}

impl std::fmt::Debug for PoolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolSource::Config(config) => f
                .debug_struct("Config")
                .field("server", &config.server)
                .field("database", &config.database)
                .finish(),
            PoolSource::Default => f.write_str("Default"),
            PoolSource::Pool(_) => f.debug_tuple("Pool").field(&"<ConnectionPool>").finish(),
        }
    }
}
