//! Top-level entry points.

use crate::config::{ConnectionConfig, resolve_config};
use crate::context::{PlainContext, TransactionContext};
use crate::error::SqlChainError;
use crate::results::StepResult;
use crate::step::IntoStep;

const SINGLE_STEP_NAME: &str = "__result";

/// Run one step on its own connection and return its result directly.
///
/// Uses the process-wide default config when `config` is `None`.
///
/// ```rust,no_run
/// use sql_chain::prelude::*;
///
/// # async fn demo() -> Result<(), SqlChainError> {
/// let rows = execute(
///     None,
///     StepDefinition::prepared("select * from NodeTestTable where i1 = @i1")
///         .param("i1", 7, ParamType::Int),
/// )
/// .await?;
/// println!("{} rows", rows.len());
/// # Ok(()) }
/// ```
///
/// # Errors
/// `ConfigError` if no config is given and no default is set; otherwise any
/// error the one-step chain fails with.
pub async fn execute(
    config: Option<&ConnectionConfig>,
    step: impl IntoStep,
) -> Result<StepResult, SqlChainError> {
    let config = resolve_config(config)?;
    let mut sets = PlainContext::new(&config)
        .step(SINGLE_STEP_NAME, step)
        .run()
        .await?;
    sets.remove(SINGLE_STEP_NAME).ok_or_else(|| {
        SqlChainError::DriverError("single step produced no result".into())
    })
}

/// Start a non-transactional chain on `config`.
#[must_use]
pub fn get_plain_context(config: &ConnectionConfig) -> PlainContext {
    PlainContext::new(config)
}

/// Start a transactional chain on `config`.
#[must_use]
pub fn get_transaction_context(config: &ConnectionConfig) -> TransactionContext {
    TransactionContext::new(config)
}
