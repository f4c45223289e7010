use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::SqlChainError;
use crate::params::BoundParam;
use crate::pool::{Connection, ConnectionPool};
use crate::results::RecordSet;
use crate::statement::RETURN_VALUE_COLUMN;
use crate::types::SqlValue;

type Responder =
    Arc<dyn Fn(&ScriptedCall<'_>) -> Result<Vec<RecordSet>, SqlChainError> + Send + Sync>;

/// Something that happened on a scripted pool, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Acquired(usize),
    Executed { conn: usize, sql: String },
    Began(usize),
    Committed(usize),
    RolledBack(usize),
    /// Handed back through `ConnectionPool::release`.
    Released(usize),
    /// Taken out of circulation through `ConnectionPool::discard`.
    Discarded(usize),
    /// Dropped without going back through the pool, e.g. by a cancelled future.
    Dropped(usize),
}

#[derive(Debug, Clone, Copy)]
enum Disposal {
    Dropped,
    Released,
    Discarded,
}

thread_local! {
    static DISPOSAL: Cell<Disposal> = const { Cell::new(Disposal::Dropped) };
}

fn dispose(conn: Box<dyn Connection>, how: Disposal) {
    DISPOSAL.with(|d| d.set(how));
    drop(conn);
    DISPOSAL.with(|d| d.set(Disposal::Dropped));
}

/// A statement that ran successfully, with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub conn: usize,
    pub sql: String,
    pub params: Vec<BoundParam>,
}

impl ExecutedStatement {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// What the responder sees for one statement.
///
/// `committed` holds every statement that is durable: run outside a
/// transaction, or inside one that committed. `pending` holds the statements
/// run so far inside this connection's open transaction.
#[derive(Debug)]
pub struct ScriptedCall<'a> {
    pub conn: usize,
    pub sql: &'a str,
    pub params: &'a [BoundParam],
    pub in_transaction: bool,
    pub committed: &'a [ExecutedStatement],
    pub pending: &'a [ExecutedStatement],
}

impl ScriptedCall<'_> {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    #[must_use]
    pub fn is_procedure_call(&self) -> bool {
        self.sql.contains(RETURN_VALUE_COLUMN)
    }

    /// Statements visible to this connection: durable ones plus its own pending ones.
    pub fn visible(&self) -> impl Iterator<Item = &ExecutedStatement> {
        self.committed.iter().chain(self.pending.iter())
    }
}

struct Shared {
    responder: Responder,
    events: Mutex<Vec<PoolEvent>>,
    committed: Mutex<Vec<ExecutedStatement>>,
    next_id: AtomicUsize,
    leased: AtomicUsize,
    max_leased: AtomicUsize,
    fail_acquire: Mutex<Option<String>>,
    fail_begin: Mutex<Option<String>>,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Shared {
    fn log(&self, event: PoolEvent) {
        lock(&self.events).push(event);
    }

    async fn round_trip(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A `ConnectionPool` whose connections answer statements with a closure.
///
/// ```rust
/// use sql_chain::prelude::*;
/// use sql_chain::test_utils::{ScriptedPool, rows_set};
///
/// let pool = ScriptedPool::new(|call| {
///     Ok(vec![rows_set(&["sql"], vec![vec![SqlValue::Text(call.sql.to_string())]])])
/// });
/// assert_eq!(pool.leased(), 0);
/// ```
#[derive(Clone)]
pub struct ScriptedPool {
    shared: Arc<Shared>,
    limit: Option<Arc<Semaphore>>,
    acquire_timeout: Option<Duration>,
}

impl ScriptedPool {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ScriptedCall<'_>) -> Result<Vec<RecordSet>, SqlChainError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                responder: Arc::new(responder),
                events: Mutex::new(Vec::new()),
                committed: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                leased: AtomicUsize::new(0),
                max_leased: AtomicUsize::new(0),
                fail_acquire: Mutex::new(None),
                fail_begin: Mutex::new(None),
                fail_commit: AtomicBool::new(false),
                fail_rollback: AtomicBool::new(false),
                latency: Mutex::new(None),
            }),
            limit: None,
            acquire_timeout: None,
        }
    }

    /// Every statement succeeds; procedure calls report return code 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|call| {
            if call.is_procedure_call() {
                Ok(vec![super::status_set(0, &[])])
            } else {
                Ok(Vec::new())
            }
        })
    }

    /// Allow at most `max` connections out at once; `acquire` waits up to
    /// `timeout` for one to come back.
    #[must_use]
    pub fn with_capacity(mut self, max: usize, timeout: Option<Duration>) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max)));
        self.acquire_timeout = timeout;
        self
    }

    /// Make the next `acquire` fail with `SqlChainError::PoolError(message)`.
    pub fn fail_next_acquire(&self, message: impl Into<String>) {
        *lock(&self.shared.fail_acquire) = Some(message.into());
    }

    /// Make the next `begin_transaction` fail with `SqlChainError::DriverError(message)`.
    pub fn fail_next_begin(&self, message: impl Into<String>) {
        *lock(&self.shared.fail_begin) = Some(message.into());
    }

    /// Make every `commit` fail until switched off again.
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make every `rollback` fail until switched off again. A failed rollback
    /// leaves the transaction open on the connection.
    pub fn fail_rollbacks(&self, fail: bool) {
        self.shared.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Delay every statement, commit and rollback by `latency` before it
    /// takes effect. `None` answers at once.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.shared.latency) = latency;
    }

    #[must_use]
    pub fn events(&self) -> Vec<PoolEvent> {
        lock(&self.shared.events).clone()
    }

    /// SQL of every statement sent, in order, including failed ones.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PoolEvent::Executed { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn committed(&self) -> Vec<ExecutedStatement> {
        lock(&self.shared.committed).clone()
    }

    /// Connections currently out of the pool.
    #[must_use]
    pub fn leased(&self) -> usize {
        self.shared.leased.load(Ordering::SeqCst)
    }

    /// Highest number of connections that were out at the same time.
    #[must_use]
    pub fn max_leased(&self) -> usize {
        self.shared.max_leased.load(Ordering::SeqCst)
    }

    async fn permit(&self) -> Result<Option<OwnedSemaphorePermit>, SqlChainError> {
        let Some(limit) = &self.limit else {
            return Ok(None);
        };
        let acquire = limit.clone().acquire_owned();
        let permit = match self.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                SqlChainError::PoolError("timed out waiting for a connection".into())
            })?,
            None => acquire.await,
        };
        permit
            .map(Some)
            .map_err(|_| SqlChainError::PoolError("pool is closed".into()))
    }
}

#[async_trait]
impl ConnectionPool for ScriptedPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, SqlChainError> {
        if let Some(message) = lock(&self.shared.fail_acquire).take() {
            return Err(SqlChainError::PoolError(message));
        }
        let permit = self.permit().await?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let leased = self.shared.leased.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_leased.fetch_max(leased, Ordering::SeqCst);
        self.shared.log(PoolEvent::Acquired(id));
        Ok(Box::new(ScriptedConnection {
            id,
            shared: self.shared.clone(),
            in_transaction: false,
            pending: Vec::new(),
            _permit: permit,
        }))
    }

    fn release(&self, conn: Box<dyn Connection>) {
        dispose(conn, Disposal::Released);
    }

    fn discard(&self, conn: Box<dyn Connection>) {
        dispose(conn, Disposal::Discarded);
    }
}

struct ScriptedConnection {
    id: usize,
    shared: Arc<Shared>,
    in_transaction: bool,
    pending: Vec<ExecutedStatement>,
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<Vec<RecordSet>, SqlChainError> {
        self.shared.log(PoolEvent::Executed {
            conn: self.id,
            sql: sql.to_string(),
        });
        self.shared.round_trip().await;
        let committed = lock(&self.shared.committed).clone();
        let call = ScriptedCall {
            conn: self.id,
            sql,
            params,
            in_transaction: self.in_transaction,
            committed: &committed,
            pending: &self.pending,
        };
        let sets = (self.shared.responder)(&call)?;

        let statement = ExecutedStatement {
            conn: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        if self.in_transaction {
            self.pending.push(statement);
        } else {
            lock(&self.shared.committed).push(statement);
        }
        Ok(sets)
    }

    async fn begin_transaction(&mut self) -> Result<(), SqlChainError> {
        if self.in_transaction {
            return Err(SqlChainError::DriverError(
                "transaction already open on this connection".into(),
            ));
        }
        if let Some(message) = lock(&self.shared.fail_begin).take() {
            return Err(SqlChainError::DriverError(message));
        }
        self.in_transaction = true;
        self.shared.log(PoolEvent::Began(self.id));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlChainError> {
        self.shared.round_trip().await;
        if self.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(SqlChainError::DriverError("commit failed".into()));
        }
        self.in_transaction = false;
        lock(&self.shared.committed).append(&mut self.pending);
        self.shared.log(PoolEvent::Committed(self.id));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlChainError> {
        self.shared.round_trip().await;
        if self.shared.fail_rollback.load(Ordering::SeqCst) {
            return Err(SqlChainError::DriverError("rollback failed".into()));
        }
        self.in_transaction = false;
        self.pending.clear();
        self.shared.log(PoolEvent::RolledBack(self.id));
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.shared.leased.fetch_sub(1, Ordering::SeqCst);
        let event = match DISPOSAL.with(|d| d.replace(Disposal::Dropped)) {
            Disposal::Released => PoolEvent::Released(self.id),
            Disposal::Discarded => PoolEvent::Discarded(self.id),
            Disposal::Dropped => PoolEvent::Dropped(self.id),
        };
        self.shared.log(event);
    }
}
