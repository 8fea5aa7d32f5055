//! The query/execution layer consumed by the association engine.
//!
//! [`Executor`] is the seam: the engine hands it statements, it hands back
//! rows and counts. [`SqlExecutor`] renders statements for a [`Dialect`] and
//! runs them on any [`Connection`].

use crate::expr::Dialect;
use crate::statement::{Delete, Save, Select, Update};
use asupersync::{Cx, Outcome};
use relmodel_core::{Connection, Error, Row, Value};

/// Executes association statements.
///
/// All operations are async and take a `Cx` for cancellation. Implementations
/// must be `Send + Sync`.
pub trait Executor: Send + Sync {
    /// Run a SELECT and return every row.
    fn fetch(
        &self,
        cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run the COUNT(*) form of a SELECT.
    fn count(&self, cx: &Cx, select: &Select) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run an UPDATE and return rows affected.
    fn update_columns(
        &self,
        cx: &Cx,
        update: &Update,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run a DELETE and return rows affected.
    fn delete(&self, cx: &Cx, delete: &Delete) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run an insert-or-update.
    ///
    /// Returns the generated key when the statement left a key column for the
    /// database to fill and a row was actually inserted.
    fn save(&self, cx: &Cx, save: &Save) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;
}

/// SQL-rendering [`Executor`] over a [`Connection`].
#[derive(Debug)]
pub struct SqlExecutor<C> {
    conn: C,
    dialect: Dialect,
}

impl<C: Connection> SqlExecutor<C> {
    /// Wrap a connection, rendering PostgreSQL.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            dialect: Dialect::default(),
        }
    }

    /// Render statements for another dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[tracing::instrument(level = "debug", skip(self, cx, select), fields(table = %select.table))]
    async fn run_fetch(&self, cx: &Cx, select: &Select) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = select.build(self.dialect);
        tracing::trace!(sql = %sql, params = params.len(), "Executing SELECT");
        self.conn.query(cx, &sql, &params).await.map(|rows| {
            tracing::debug!(row_count = rows.len(), "SELECT complete");
            rows
        })
    }

    #[tracing::instrument(level = "debug", skip(self, cx, select), fields(table = %select.table))]
    async fn run_count(&self, cx: &Cx, select: &Select) -> Outcome<u64, Error> {
        let (sql, params) = select.build_count(self.dialect);
        tracing::trace!(sql = %sql, "Executing COUNT");
        let row = match self.conn.query_one(cx, &sql, &params).await {
            Outcome::Ok(row) => row,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let count = row
            .as_ref()
            .and_then(|r| r.get(0))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Outcome::Ok(u64::try_from(count).unwrap_or(0))
    }

    #[tracing::instrument(level = "debug", skip(self, cx, sql, params))]
    async fn run_execute(
        &self,
        cx: &Cx,
        verb: &'static str,
        sql: String,
        params: Vec<Value>,
    ) -> Outcome<u64, Error> {
        tracing::trace!(sql = %sql, params = params.len(), "Executing {}", verb);
        self.conn.execute(cx, &sql, &params).await.map(|affected| {
            tracing::debug!(affected, "{} complete", verb);
            affected
        })
    }

    #[tracing::instrument(level = "debug", skip(self, cx, save), fields(table = %save.table))]
    async fn run_save(&self, cx: &Cx, save: &Save) -> Outcome<Option<i64>, Error> {
        let (sql, params) = save.build(self.dialect);
        tracing::trace!(sql = %sql, params = params.len(), "Executing INSERT");
        if save.generates_key() {
            self.conn
                .insert(cx, &sql, &params)
                .await
                .map(|id| (id != 0).then_some(id))
        } else {
            self.conn.execute(cx, &sql, &params).await.map(|_| None)
        }
    }
}

impl<C: Connection> Executor for SqlExecutor<C> {
    fn fetch(
        &self,
        cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.run_fetch(cx, select)
    }

    fn count(&self, cx: &Cx, select: &Select) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.run_count(cx, select)
    }

    fn update_columns(
        &self,
        cx: &Cx,
        update: &Update,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let (sql, params) = update.build(self.dialect);
        self.run_execute(cx, "UPDATE", sql, params)
    }

    fn delete(&self, cx: &Cx, delete: &Delete) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let (sql, params) = delete.build(self.dialect);
        self.run_execute(cx, "DELETE", sql, params)
    }

    fn save(&self, cx: &Cx, save: &Save) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        self.run_save(cx, save)
    }
}
