//! Expression DSL, statements and SQL execution for relmodel.
//!
//! `relmodel-query` is the **query/execution layer** the association engine
//! is written against:
//!
//! - **Expression DSL**: `Expr` builds equality, (tuple) membership, AND, OR,
//!   NOT and IS NULL predicates.
//! - **Statements**: `Select` (with an optional `Join`), `Update`, `Delete` and
//!   the insert-or-update `Save`.
//! - **Dialect support**: renders SQL for Postgres, MySQL, and SQLite.
//! - **Execution**: the `Executor` trait, implemented for any `Connection` by
//!   `SqlExecutor`.

pub mod executor;
pub mod expr;
pub mod join;
pub mod statement;

pub use executor::{Executor, SqlExecutor};
pub use expr::{ALWAYS_FALSE, ALWAYS_TRUE, BinaryOp, Dialect, Expr, UnaryOp};
pub use join::Join;
pub use statement::{Delete, OnConflict, Save, Select, Update};
