//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::api::{execute, get_plain_context, get_transaction_context};
pub use crate::config::{ConnectionConfig, reset_default_config, set_default_config};
pub use crate::context::{
    PlainContext, TransactionContext, TransactionHandle, TransactionResults, TransactionState,
};
pub use crate::error::{ChainFailure, SqlChainError};
pub use crate::pool::{Connection, ConnectionPool, register_pool};
pub use crate::results::{RecordSet, Row, StepData, StepResult, StepResults};
pub use crate::step::{IntoStep, StepDefinition};
pub use crate::types::{ParamType, SqlValue};

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlPool;
