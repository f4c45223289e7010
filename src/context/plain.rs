use std::sync::Arc;

use super::PoolSource;
use crate::chain::StepChain;
use crate::config::ConnectionConfig;
use crate::error::ChainFailure;
use crate::pool::ConnectionPool;
use crate::results::StepResults;
use crate::step::IntoStep;

/// Runs a chain on one pooled connection, outside any transaction.
///
/// The connection is leased when [`run`](PlainContext::run) starts and returned
/// to the pool before `run` returns, whether the chain succeeded or not. It is
/// never exposed to the caller.
///
/// ```rust,no_run
/// use sql_chain::prelude::*;
///
/// # async fn demo(config: ConnectionConfig) -> Result<(), ChainFailure> {
/// let sets = get_plain_context(&config)
///     .step("CreateTable", StepDefinition::query("create table T (i1 int)"))
///     .step(
///         "Insert",
///         StepDefinition::prepared("insert into T (i1) values (@i1)")
///             .param("i1", 1, ParamType::Int),
///     )
///     .run()
///     .await?;
/// assert_eq!(sets.len(), 2);
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct PlainContext {
    source: PoolSource,
    chain: StepChain,
}

impl PlainContext {
    #[must_use]
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::from_source(PoolSource::Config(config.clone()))
    }

    /// Use the process-wide default config, looked up when the chain runs.
    #[must_use]
    pub fn from_default() -> Self {
        Self::from_source(PoolSource::Default)
    }

    /// Run against a caller-supplied pool adapter.
    #[must_use]
    pub fn with_pool(pool: Arc<dyn ConnectionPool>) -> Self {
        Self::from_source(PoolSource::Pool(pool))
    }

    fn from_source(source: PoolSource) -> Self {
        Self {
            source,
            chain: StepChain::new(),
        }
    }

    /// Append a named step.
    #[must_use]
    pub fn step(mut self, name: impl Into<String>, step: impl IntoStep) -> Self {
        self.chain.push(name, step);
        self
    }

    /// Lease a connection, run every step, release the connection.
    ///
    /// # Errors
    /// Returns a `ChainFailure` carrying the first error (configuration,
    /// parameter, pool or query) and the results of the steps that completed.
    pub async fn run(mut self) -> Result<StepResults, ChainFailure> {
        self.chain.check().map_err(ChainFailure::before_start)?;
        let pool = self.source.resolve().map_err(ChainFailure::before_start)?;
        let mut conn = pool.acquire().await.map_err(ChainFailure::before_start)?;
        tracing::debug!(steps = self.chain.len(), "acquired connection for plain chain");

        let outcome = self.chain.run(conn.as_mut()).await;
        pool.release(conn);
        tracing::debug!(ok = outcome.is_ok(), "released connection for plain chain");
        outcome
    }
}
