//! The step-chain runner: named steps, run in order on one connection,
//! stopping at the first failure.

use crate::error::{ChainFailure, SqlChainError};
use crate::params::bind_params;
use crate::pool::Connection;
use crate::results::StepResults;
use crate::statement::execute_step;
use crate::step::{IntoStep, StepDefinition};

/// Ordered list of named steps.
///
/// Problems found while steps are added (duplicate names, definitions that do
/// not convert) are kept and reported by [`StepChain::check`], so the fluent
/// builders on the contexts never have to return a `Result` mid-chain.
#[derive(Debug, Default)]
pub struct StepChain {
    steps: Vec<(String, StepDefinition)>,
    deferred: Option<SqlChainError>,
}

impl StepChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, step: impl IntoStep) {
        let name = name.into();
        if self.deferred.is_some() {
            return;
        }
        if name.is_empty() {
            self.deferred = Some(SqlChainError::ConfigError("step name is empty".into()));
            return;
        }
        if self.steps.iter().any(|(existing, _)| *existing == name) {
            self.deferred = Some(SqlChainError::ConfigError(format!(
                "step `{name}` is declared more than once"
            )));
            return;
        }
        match step.into_step() {
            Ok(step) => self.steps.push((name, step)),
            Err(e) => self.deferred = Some(e),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Everything that can be checked without a connection: deferred builder
    /// errors, step validation and parameter binding.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn check(&mut self) -> Result<(), SqlChainError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        for (_, step) in &self.steps {
            step.validate()?;
            bind_params(step.params())?;
        }
        Ok(())
    }

    /// Run every step in declaration order on `conn`.
    ///
    /// Step *i+1* is only sent once step *i* and all of its record sets have
    /// come back. On the first failure the remaining steps are skipped and the
    /// results gathered so far travel with the error.
    ///
    /// # Errors
    /// Returns a `ChainFailure` wrapping the failing step's error.
    pub async fn run(&self, conn: &mut dyn Connection) -> Result<StepResults, ChainFailure> {
        let mut results = StepResults::default();
        for (name, step) in &self.steps {
            tracing::debug!(step = %name, mode = step.mode().kind(), "running step");
            match execute_step(conn, name, step).await {
                Ok(result) => {
                    tracing::trace!(step = %name, len = result.len(), "step finished");
                    results.insert(name, result);
                }
                Err(error) => {
                    tracing::debug!(step = %name, "step failed, skipping remaining steps");
                    return Err(ChainFailure {
                        error,
                        completed: results,
                        rollback_error: None,
                    });
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use crate::test_utils::{ScriptedPool, rows_set};
    use crate::types::{ParamType, SqlValue};

    #[test]
    fn duplicate_names_are_reported_by_check() {
        let mut chain = StepChain::new();
        chain.push("a", StepDefinition::query("select 1"));
        chain.push("a", StepDefinition::query("select 2"));
        assert!(matches!(chain.check(), Err(SqlChainError::ConfigError(_))));
    }

    #[test]
    fn check_binds_every_step() {
        let mut chain = StepChain::new();
        chain.push("ok", StepDefinition::query("select 1"));
        chain.push(
            "bad",
            StepDefinition::prepared("select @i").param("i", "x", ParamType::Int),
        );
        assert!(matches!(chain.check(), Err(SqlChainError::ParameterError(_))));
    }

    #[tokio::test]
    async fn empty_chain_completes_with_no_results() {
        let pool = ScriptedPool::empty();
        let mut conn = pool.acquire().await.unwrap();
        let results = StepChain::new().run(conn.as_mut()).await.unwrap();
        assert!(results.is_empty());
        assert!(pool.executed().is_empty());
    }

    #[tokio::test]
    async fn steps_run_in_declaration_order() {
        let pool = ScriptedPool::new(|call| {
            Ok(vec![rows_set(&["sql"], vec![vec![SqlValue::Text(call.sql.into())]])])
        });
        let mut chain = StepChain::new();
        for i in 0..5 {
            chain.push(format!("s{i}"), StepDefinition::query(format!("select {i}")));
        }
        let mut conn = pool.acquire().await.unwrap();
        let results = chain.run(conn.as_mut()).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(
            pool.executed(),
            (0..5).map(|i| format!("select {i}")).collect::<Vec<_>>()
        );
        assert_eq!(
            results["s3"].rows()[0].get("sql").and_then(SqlValue::as_text),
            Some("select 3")
        );
    }
}
