//! Named, ordered SQL step chains for SQL Server.
//!
//! A chain is a list of named steps (ad-hoc queries, parameterized statements
//! or stored procedure calls) run one after another on a single pooled
//! connection. The first failing step stops the chain. A transactional chain
//! runs inside one transaction and, when every step succeeded, hands the
//! commit/rollback decision back to the caller through a [`TransactionHandle`].
//!
//! ```rust,no_run
//! use sql_chain::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlChainError> {
//! let config = ConnectionConfig::new("localhost", "tempdb", "sa", "secret");
//!
//! let TransactionResults { sets, transaction } = get_transaction_context(&config)
//!     .step(
//!         "insert",
//!         StepDefinition::prepared("insert into Widgets (name) values (@name)")
//!             .param("name", "gear", ParamType::NVarChar(Some(50))),
//!     )
//!     .step("count", StepDefinition::query("select count(*) as n from Widgets"))
//!     .run()
//!     .await?;
//!
//! println!("{:?}", sets["count"].rows()[0].get("n"));
//! transaction.commit().await?;
//! # Ok(()) }
//! ```

pub mod api;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod step;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use api::{execute, get_plain_context, get_transaction_context};
pub use chain::StepChain;
pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, default_config, reset_default_config,
    set_default_config,
};
pub use context::{
    PlainContext, TransactionContext, TransactionHandle, TransactionResults, TransactionState,
};
pub use error::{ChainFailure, SqlChainError};
pub use params::{BoundParam, ParamDirection, StepParam, bind_params};
pub use pool::{Connection, ConnectionPool, clear_pools, register_pool};
pub use results::{RecordSet, Row, StepData, StepResult, StepResults};
pub use step::{IntoStep, RawParam, RawStepDefinition, StepDefinition, StepMode};
pub use types::{ParamType, SqlValue};

#[cfg(feature = "mssql")]
pub use mssql::MssqlPool;
