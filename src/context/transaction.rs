use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::PoolSource;
use crate::chain::StepChain;
use crate::config::ConnectionConfig;
use crate::error::{ChainFailure, SqlChainError};
use crate::pool::{Connection, ConnectionPool};
use crate::results::StepResults;
use crate::step::IntoStep;

/// Runs a chain inside one transaction and leaves the commit/rollback decision
/// to the caller.
///
/// On success the connection stays leased and is handed back inside a
/// [`TransactionHandle`]; it only returns to the pool once the handle is
/// committed or rolled back. A handle kept alive without being resolved holds
/// its pooled connection (and the server-side locks of the transaction) for as
/// long as it lives. Nothing times it out.
///
/// On failure the transaction is rolled back and the connection released before
/// `run` returns; no handle is produced.
#[derive(Debug)]
pub struct TransactionContext {
    source: PoolSource,
    chain: StepChain,
}

/// Output of a successful transactional chain.
pub struct TransactionResults {
    pub sets: StepResults,
    pub transaction: TransactionHandle,
}

impl fmt::Debug for TransactionResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionResults")
            .field("sets", &self.sets)
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl TransactionContext {
    #[must_use]
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::from_source(PoolSource::Config(config.clone()))
    }

    /// Use the process-wide default config, looked up when the chain runs.
    #[must_use]
    pub fn from_default() -> Self {
        Self::from_source(PoolSource::Default)
    }

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

    /// Lease a connection, begin a transaction and run every step in it.
    ///
    /// If this future is dropped before it finishes, the connection is
    /// discarded rather than released, so a half-run transaction never goes
    /// back to the pool.
    ///
    /// # Errors
    /// Returns a `ChainFailure` carrying the first error. If the chain had
    /// already begun, the transaction was rolled back and the connection
    /// released; `rollback_error` is set if that rollback failed as well, and
    /// the connection was discarded instead.
    pub async fn run(mut self) -> Result<TransactionResults, ChainFailure> {
        self.chain.check().map_err(ChainFailure::before_start)?;
        let pool = self.source.resolve().map_err(ChainFailure::before_start)?;
        let conn = pool.acquire().await.map_err(ChainFailure::before_start)?;

        let mut inner = HandleInner::in_flight(conn, pool);
        let conn = inner
            .slot
            .get_mut()
            .connection()
            .map_err(ChainFailure::before_start)?;

        let begun = conn.begin_transaction().await;
        if let Err(e) = begun {
            settle(
                inner.pool.as_ref(),
                inner.slot.get_mut(),
                TransactionState::RolledBack,
                true,
            );
            return Err(ChainFailure::before_start(e));
        }
        tracing::debug!(steps = self.chain.len(), "began transaction");

        match self.chain.run(conn.as_mut()).await {
            Ok(sets) => {
                inner.slot.get_mut().mark_idle();
                Ok(TransactionResults {
                    sets,
                    transaction: TransactionHandle {
                        inner: Arc::new(inner),
                    },
                })
            }
            Err(mut failure) => {
                let clean = match conn.rollback().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "rollback after failed step failed");
                        failure.rollback_error = Some(e);
                        false
                    }
                };
                settle(
                    inner.pool.as_ref(),
                    inner.slot.get_mut(),
                    TransactionState::RolledBack,
                    clean,
                );
                tracing::debug!("rolled back transaction after failed step");
                Err(failure)
            }
        }
    }
}

/// Where a transaction handle is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    AwaitingResolution,
    Committed,
    RolledBack,
    /// The connection was closed with the outcome unknown to this side: a
    /// rollback failed, or a commit or rollback was cancelled midway. The
    /// server rolls back whatever was still open when the connection closed.
    Discarded,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::AwaitingResolution => f.write_str("awaiting resolution"),
            TransactionState::Committed => f.write_str("committed"),
            TransactionState::RolledBack => f.write_str("rolled back"),
            TransactionState::Discarded => f.write_str("discarded"),
        }
    }
}

enum Slot {
    /// `in_flight` is set while a driver call on `conn` has started and not
    /// yet returned. Still set afterwards means that call was cancelled.
    Open {
        conn: Box<dyn Connection>,
        in_flight: bool,
    },
    Resolved(TransactionState),
}

impl Slot {
    fn connection(&mut self) -> Result<&mut Box<dyn Connection>, SqlChainError> {
        match self {
            Slot::Open { conn, .. } => Ok(conn),
            Slot::Resolved(state) => Err(already(*state)),
        }
    }

    fn mark_idle(&mut self) {
        if let Slot::Open { in_flight, .. } = self {
            *in_flight = false;
        }
    }

    fn state(&self) -> TransactionState {
        match self {
            Slot::Open { .. } => TransactionState::AwaitingResolution,
            Slot::Resolved(state) => *state,
        }
    }
}

fn already(state: TransactionState) -> SqlChainError {
    SqlChainError::TransactionStateError(format!("transaction is already {state}"))
}

/// Record `state` and hand the connection back: released when `clean`,
/// discarded otherwise.
fn settle(pool: &dyn ConnectionPool, slot: &mut Slot, state: TransactionState, clean: bool) {
    if let Slot::Open { conn, .. } = std::mem::replace(slot, Slot::Resolved(state)) {
        if clean {
            pool.release(conn);
        } else {
            pool.discard(conn);
        }
    }
}

struct HandleInner {
    slot: Mutex<Slot>,
    pool: Arc<dyn ConnectionPool>,
}

impl HandleInner {
    fn in_flight(conn: Box<dyn Connection>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            slot: Mutex::new(Slot::Open {
                conn,
                in_flight: true,
            }),
            pool,
        }
    }

    /// Borrow the open connection for a resolving call and mark it in flight.
    ///
    /// A slot still in flight from an earlier, cancelled call cannot be
    /// trusted: its connection is discarded and the handle ends `Discarded`.
    fn start_resolution<'a>(
        &self,
        slot: &'a mut Slot,
    ) -> Result<&'a mut Box<dyn Connection>, SqlChainError> {
        if let Slot::Open {
            in_flight: true, ..
        } = slot
        {
            tracing::warn!("earlier commit or rollback was cancelled; discarding connection");
            settle(self.pool.as_ref(), slot, TransactionState::Discarded, false);
            return Err(SqlChainError::TransactionStateError(
                "an earlier commit or rollback was cancelled; the connection was discarded"
                    .into(),
            ));
        }
        match slot {
            Slot::Open { conn, in_flight } => {
                *in_flight = true;
                Ok(conn)
            }
            Slot::Resolved(state) => Err(already(*state)),
        }
    }
}

/// Caller-held control over a transaction whose steps all succeeded.
///
/// Exactly one of [`commit`](Self::commit) or [`rollback`](Self::rollback)
/// succeeds in resolving it; any later call fails with
/// `SqlChainError::TransactionStateError`. Clones share the same transaction.
///
/// The connection stays in the handle until a resolving call has finished, so
/// cancelling `commit` or `rollback` (by a timeout, say) leaves it leased and
/// never returns a connection with an open transaction to the pool.
///
/// Dropping the last clone while the transaction is still open rolls it back
/// on the current Tokio runtime and releases the connection. Outside a runtime
/// the connection is discarded instead.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.slot.try_lock() {
            Ok(slot) => slot.state().to_string(),
            Err(_) => "<resolving>".to_string(),
        };
        f.debug_struct("TransactionHandle")
            .field("state", &state)
            .finish()
    }
}

impl TransactionHandle {
    /// Current state; waits if a commit or rollback is in progress.
    pub async fn state(&self) -> TransactionState {
        self.inner.slot.lock().await.state()
    }

    /// Commit and return the connection to the pool.
    ///
    /// If the commit itself fails the transaction is rolled back, the
    /// connection released and the commit error returned; the handle ends up
    /// `RolledBack`. If that rollback fails too, the connection is discarded,
    /// the handle ends up `Discarded` and both errors come back as
    /// `SqlChainError::CommitError`.
    ///
    /// # Errors
    /// `TransactionStateError` if already resolved, otherwise the driver error.
    pub async fn commit(&self) -> Result<(), SqlChainError> {
        let mut slot = self.inner.slot.lock().await;
        let conn = self.inner.start_resolution(&mut slot)?;

        let commit_error = match conn.commit().await {
            Ok(()) => {
                settle(self.inner.pool.as_ref(), &mut slot, TransactionState::Committed, true);
                tracing::debug!("committed transaction");
                return Ok(());
            }
            Err(e) => e,
        };

        match conn.rollback().await {
            Ok(()) => {
                settle(self.inner.pool.as_ref(), &mut slot, TransactionState::RolledBack, true);
                tracing::debug!(error = %commit_error, "commit failed; rolled back");
                Err(commit_error)
            }
            Err(rollback_error) => {
                settle(self.inner.pool.as_ref(), &mut slot, TransactionState::Discarded, false);
                tracing::warn!(
                    error = %commit_error,
                    %rollback_error,
                    "commit and rollback both failed; discarding connection"
                );
                Err(SqlChainError::CommitError {
                    source: Box::new(commit_error),
                    rollback_error: Box::new(rollback_error),
                })
            }
        }
    }

    /// Roll back and return the connection to the pool.
    ///
    /// # Errors
    /// `TransactionStateError` if already resolved, otherwise the driver error.
    /// A failed rollback discards the connection and leaves the handle
    /// `Discarded`.
    pub async fn rollback(&self) -> Result<(), SqlChainError> {
        let mut slot = self.inner.slot.lock().await;
        let conn = self.inner.start_resolution(&mut slot)?;

        match conn.rollback().await {
            Ok(()) => {
                settle(self.inner.pool.as_ref(), &mut slot, TransactionState::RolledBack, true);
                tracing::debug!("rolled back transaction");
                Ok(())
            }
            Err(e) => {
                settle(self.inner.pool.as_ref(), &mut slot, TransactionState::Discarded, false);
                tracing::warn!(error = %e, "rollback failed; discarding connection");
                Err(e)
            }
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let slot = std::mem::replace(
            self.slot.get_mut(),
            Slot::Resolved(TransactionState::Discarded),
        );
        let Slot::Open {
            mut conn,
            in_flight,
        } = slot
        else {
            return;
        };
        if in_flight {
            tracing::warn!("transaction dropped during a driver call; discarding connection");
            self.pool.discard(conn);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!("transaction handle dropped while open; rolling back");
                let pool = self.pool.clone();
                runtime.spawn(async move {
                    match conn.rollback().await {
                        Ok(()) => pool.release(conn),
                        Err(error) => {
                            tracing::warn!(
                                %error,
                                "rollback of dropped transaction failed; discarding connection"
                            );
                            pool.discard(conn);
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "transaction handle dropped while open outside a runtime; discarding connection"
                );
                self.pool.discard(conn);
            }
        }
    }
}
