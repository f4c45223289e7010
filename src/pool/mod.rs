//! Connection pool adapter: the boundary between the chain engine and a driver.
//!
//! The engine only ever borrows one connection per chain through
//! [`ConnectionPool::acquire`] and hands it back through
//! [`ConnectionPool::release`], or through [`ConnectionPool::discard`] when the
//! connection may still hold an open transaction. Sockets, retries and sizing
//! stay behind this boundary.

mod registry;

use async_trait::async_trait;

use crate::error::SqlChainError;
use crate::params::BoundParam;
use crate::results::RecordSet;

pub use registry::{clear_pools, pool_for, register_pool};

/// One live connection leased from a pool.
///
/// `&mut self` on every call keeps a connection to one statement at a time.
#[async_trait]
pub trait Connection: Send {
    /// Run `sql` with `params` bound positionally as `@P1..@Pn` and return every
    /// record set the batch produced, in order.
    ///
    /// # Errors
    /// Returns the driver's error unchanged.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<Vec<RecordSet>, SqlChainError>;

    /// # Errors
    /// Returns the driver's error unchanged.
    async fn begin_transaction(&mut self) -> Result<(), SqlChainError>;

    /// # Errors
    /// Returns the driver's error unchanged.
    async fn commit(&mut self) -> Result<(), SqlChainError>;

    /// # Errors
    /// Returns the driver's error unchanged.
    async fn rollback(&mut self) -> Result<(), SqlChainError>;

    /// Close the connection instead of returning it for reuse. The server
    /// rolls back whatever transaction was still open on it.
    fn close(self: Box<Self>) {
        drop(self);
    }
}

/// Pool of connections to one configured database.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Wait for a free connection.
    ///
    /// # Errors
    /// Returns `SqlChainError::PoolError` if the pool is exhausted, times out or
    /// cannot connect.
    async fn acquire(&self) -> Result<Box<dyn Connection>, SqlChainError>;

    /// Return a connection. The default drops it, which hands pooled
    /// connections back to their pool.
    fn release(&self, conn: Box<dyn Connection>) {
        drop(conn);
    }

    /// Take a connection out of circulation. Used when its transaction state
    /// is unknown: a rollback failed, or a driver call was cut off midway.
    fn discard(&self, conn: Box<dyn Connection>) {
        conn.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for Counting {
        async fn execute(
            &mut self,
            _sql: &str,
            _params: &[BoundParam],
        ) -> Result<Vec<RecordSet>, SqlChainError> {
            Ok(Vec::new())
        }

        async fn begin_transaction(&mut self) -> Result<(), SqlChainError> {
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), SqlChainError> {
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), SqlChainError> {
            Ok(())
        }

        fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Plain {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionPool for Plain {
        async fn acquire(&self) -> Result<Box<dyn Connection>, SqlChainError> {
            Ok(Box::new(Counting {
                closed: self.closed.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn discard_closes_and_release_does_not() {
        let pool = Plain {
            closed: Arc::new(AtomicUsize::new(0)),
        };
        pool.release(pool.acquire().await.unwrap());
        assert_eq!(pool.closed.load(Ordering::SeqCst), 0);
        pool.discard(pool.acquire().await.unwrap());
        assert_eq!(pool.closed.load(Ordering::SeqCst), 1);
    }
}
