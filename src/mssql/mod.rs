//! SQL Server backend: a `ConnectionPool` over `deadpool-tiberius`.
//!
//! - pool: pool construction from `ConnectionConfig` and the leased connection
//! - params: `BoundParam` to tiberius wire values
//! - query: batch execution and record set extraction

mod params;
mod pool;
mod query;

pub use pool::MssqlPool;
