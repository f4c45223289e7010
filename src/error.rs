use thiserror::Error;

use crate::results::StepResults;

#[derive(Debug, Error)]
pub enum SqlChainError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// A statement failed at the database. Carries the step it belonged to and the
    /// SQL text or procedure name that was sent.
    #[error("Query error in step `{step}` ({statement}): {source}")]
    QueryError {
        step: String,
        statement: String,
        source: Box<SqlChainError>,
    },

    /// A commit failed and so did the rollback attempted right after it.
    #[error("Commit failed: {source}; rollback after it failed too: {rollback_error}")]
    CommitError {
        source: Box<SqlChainError>,
        rollback_error: Box<SqlChainError>,
    },

    #[error("Transaction state error: {0}")]
    TransactionStateError(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Driver error: {0}")]
    DriverError(String),
}

impl SqlChainError {
    /// Wrap a driver failure with the step context it happened in.
    pub(crate) fn query(step: &str, statement: &str, source: SqlChainError) -> Self {
        SqlChainError::QueryError {
            step: step.to_string(),
            statement: statement.to_string(),
            source: Box::new(source),
        }
    }

    /// Name of the step a `QueryError` belongs to.
    #[must_use]
    pub fn step_name(&self) -> Option<&str> {
        match self {
            SqlChainError::QueryError { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Error returned when a chain stops before all steps completed.
///
/// `completed` holds the results of every step that finished before the failing
/// one; it never contains the failing step or anything after it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ChainFailure {
    #[source]
    pub error: SqlChainError,
    pub completed: StepResults,
    /// Set when a transactional chain failed and the implicit rollback failed too.
    pub rollback_error: Option<SqlChainError>,
}

impl ChainFailure {
    pub(crate) fn before_start(error: SqlChainError) -> Self {
        Self {
            error,
            completed: StepResults::default(),
            rollback_error: None,
        }
    }

    /// Drop the partial results and keep the underlying error.
    #[must_use]
    pub fn into_error(self) -> SqlChainError {
        self.error
    }
}

impl From<ChainFailure> for SqlChainError {
    fn from(failure: ChainFailure) -> Self {
        failure.error
    }
}
