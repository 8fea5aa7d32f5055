//! JOIN clause types.

use crate::expr::{Dialect, Expr};
use relmodel_core::Value;

/// An INNER JOIN clause.
///
/// The association engine only ever joins a many-to-many join table onto the
/// related table, so inner joins are all this layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Table to join
    pub table: String,
    /// ON condition
    pub on: Expr,
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            table: table.into(),
            on,
        }
    }

    /// Build the JOIN clause SQL with a specific dialect.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let on_sql = self.on.build_with_dialect(dialect, params, offset);
        format!(
            " INNER JOIN {} ON {}",
            dialect.quote_identifier(&self.table),
            on_sql
        )
    }
}
