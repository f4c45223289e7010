//! In-memory pool for exercising chains without a database server.

mod scripted;
mod test_helpers;

pub use scripted::{ExecutedStatement, PoolEvent, ScriptedCall, ScriptedPool};
pub use test_helpers::{rows_set, status_set};
