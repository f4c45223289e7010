use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlChainError;

const DEFAULT_PORT: u16 = 1433;
const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// How to reach one SQL Server database.
///
/// Contexts capture a clone, so later edits to the caller's copy never affect a
/// chain that is already built. Equal configs share one pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default = "default_trust_cert")]
    pub trust_cert: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_trust_cert() -> bool {
    true
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            instance_name: None,
            trust_cert: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn builder(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::new(server, database, user, password),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Same server and credentials, different database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Check the fields a pool cannot be built without.
    ///
    /// # Errors
    /// Returns `SqlChainError::ConfigError` naming the first missing field.
    pub fn validate(&self) -> Result<(), SqlChainError> {
        if self.server.trim().is_empty() {
            return Err(SqlChainError::ConfigError("server is required".into()));
        }
        if self.database.trim().is_empty() {
            return Err(SqlChainError::ConfigError("database is required".into()));
        }
        if self.max_connections == 0 {
            return Err(SqlChainError::ConfigError(
                "max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for `ConnectionConfig`.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.config.instance_name = Some(instance_name.into());
        self
    }

    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.config.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_acquire_timeout(Some(timeout));
        self
    }

    /// Finish the builder.
    ///
    /// # Errors
    /// Returns `SqlChainError::ConfigError` if a required field is empty.
    pub fn finish(self) -> Result<ConnectionConfig, SqlChainError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Last write wins; setting it while chains are in flight has no ordering guarantee.
static DEFAULT_CONFIG: LazyLock<RwLock<Option<ConnectionConfig>>> =
    LazyLock::new(|| RwLock::new(None));

/// Set the process-wide default configuration used when a call omits one.
pub fn set_default_config(config: ConnectionConfig) {
    let mut slot = DEFAULT_CONFIG
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *slot = Some(config);
}

/// Clear the process-wide default configuration.
pub fn reset_default_config() {
    let mut slot = DEFAULT_CONFIG
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *slot = None;
}

/// Snapshot of the process-wide default configuration.
#[must_use]
pub fn default_config() -> Option<ConnectionConfig> {
    DEFAULT_CONFIG
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone()
}

/// The explicit config if given, otherwise the process-wide default.
///
/// # Errors
/// Returns `SqlChainError::ConfigError` when neither is available.
pub fn resolve_config(
    config: Option<&ConnectionConfig>,
) -> Result<ConnectionConfig, SqlChainError> {
    match config {
        Some(config) => Ok(config.clone()),
        None => default_config().ok_or_else(|| {
            SqlChainError::ConfigError(
                "no connection config given and no default config set".into(),
            )
        }),
    }
}
