use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use super::ConnectionPool;
use crate::config::ConnectionConfig;
use crate::error::SqlChainError;

type PoolMap = HashMap<ConnectionConfig, Arc<dyn ConnectionPool>>;

static POOLS: LazyLock<Mutex<PoolMap>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Use `pool` for every chain that runs with `config`.
///
/// Replaces any pool previously registered or created for an equal config.
pub fn register_pool(config: ConnectionConfig, pool: Arc<dyn ConnectionPool>) {
    let mut pools = POOLS.lock().unwrap_or_else(PoisonError::into_inner);
    pools.insert(config, pool);
}

/// Forget every pool. Connections already leased stay valid until released.
pub fn clear_pools() {
    POOLS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// The pool serving `config`, creating a SQL Server pool on first use.
///
/// # Errors
/// Returns `SqlChainError::ConfigError` if the config is invalid or no backend
/// is compiled in, or the backend's error if the pool cannot be built.
pub fn pool_for(config: &ConnectionConfig) -> Result<Arc<dyn ConnectionPool>, SqlChainError> {
    let mut pools = POOLS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(pool) = pools.get(config) {
        return Ok(pool.clone());
    }
    config.validate()?;
    let pool = create_pool(config)?;
    tracing::debug!(
        server = %config.server,
        database = %config.database,
        "created connection pool"
    );
    pools.insert(config.clone(), pool.clone());
    Ok(pool)
}

#[cfg(feature = "mssql")]
fn create_pool(config: &ConnectionConfig) -> Result<Arc<dyn ConnectionPool>, SqlChainError> {
    Ok(Arc::new(crate::mssql::MssqlPool::new(config)?))
}

#[cfg(not(feature = "mssql"))]
fn create_pool(config: &ConnectionConfig) -> Result<Arc<dyn ConnectionPool>, SqlChainError> {
    Err(SqlChainError::ConfigError(format!(
        "no pool registered for database `{}` and no backend is enabled in this build",
        config.database
    )))
}
