//! Database connection trait.
//!
//! The association engine never talks to a connection directly; it goes
//! through the `Executor` in `relmodel-query`, whose SQL implementation
//! renders statements and hands them to a [`Connection`]. Drivers, pooling
//! and transaction management live outside this workspace: a transaction
//! handle that implements `Connection` is all a caller needs to run an
//! association operation inside a transaction.
//!
//! All operations integrate with asupersync's structured concurrency via `Cx`
//! for cancellation and timeout handling.

use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database connection capable of executing queries.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM posts WHERE user_id = $1", &[Value::BigInt(1)]).await;
/// let affected = conn.execute(&cx, "UPDATE posts SET user_id = NULL WHERE id = $1", &[Value::BigInt(10)]).await;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the last inserted ID.
    ///
    /// Returns 0 when the statement inserted nothing (e.g. a conflict was
    /// ignored). For PostgreSQL, drivers typically use `RETURNING`.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;
}
