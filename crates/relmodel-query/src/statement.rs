//! Statements issued by the association engine: SELECT, UPDATE, DELETE and
//! the insert-or-update `Save`.
//!
//! Statements are plain data. They are rendered to SQL by [`build`] methods
//! for a [`Dialect`], or interpreted directly by an in-memory executor.
//!
//! [`build`]: Select::build

use crate::expr::{Dialect, Expr};
use crate::join::Join;
use relmodel_core::Value;

fn build_where(
    conditions: &[Expr],
    dialect: Dialect,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if let Some(predicate) = Expr::and_all(conditions.iter().cloned()) {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate.build_with_dialect(dialect, params, 0));
    }
}

/// SELECT over one table, optionally joined.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub join: Option<Join>,
    pub conditions: Vec<Expr>,
}

impl Select {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join: None,
            conditions: Vec::new(),
        }
    }

    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    /// Add a WHERE condition (ANDed with existing ones).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.conditions.push(expr);
        self
    }

    /// Build `SELECT table.* ...`.
    pub fn build(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let table = dialect.quote_identifier(&self.table);
        self.build_projection(&format!("{table}.*"), dialect)
    }

    /// Build `SELECT COUNT(*) ...` with the same FROM, JOIN and WHERE.
    pub fn build_count(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let projection = Expr::count_star().build_with_dialect(dialect, &mut params, 0);
        self.build_projection(&projection, dialect)
    }

    fn build_projection(&self, projection: &str, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {}",
            projection,
            dialect.quote_identifier(&self.table)
        );
        if let Some(join) = &self.join {
            sql.push_str(&join.build_with_dialect(dialect, &mut params, 0));
        }
        build_where(&self.conditions, dialect, &mut sql, &mut params);
        (sql, params)
    }
}

/// UPDATE of explicit columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Vec<(String, Value)>,
    pub conditions: Vec<Expr>,
}

impl Update {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Set a column to a value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition (ANDed with existing ones).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.conditions.push(expr);
        self
    }

    pub fn build(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut set_clauses = Vec::with_capacity(self.set.len());
        for (column, value) in &self.set {
            params.push(value.clone());
            set_clauses.push(format!(
                "{} = {}",
                dialect.quote_identifier(column),
                dialect.placeholder(params.len())
            ));
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            set_clauses.join(", ")
        );
        build_where(&self.conditions, dialect, &mut sql, &mut params);
        (sql, params)
    }
}

/// DELETE with a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<Expr>,
}

impl Delete {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a WHERE condition (ANDed with existing ones).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.conditions.push(expr);
        self
    }

    pub fn build(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        build_where(&self.conditions, dialect, &mut sql, &mut params);
        (sql, params)
    }
}

/// Conflict handling of a [`Save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnConflict {
    /// Plain INSERT; a conflict is an error.
    Fail,
    /// Keep the existing row.
    DoNothing,
    /// Overwrite the listed columns of the existing row.
    DoUpdate(Vec<String>),
}

/// INSERT of one row with conflict handling on its key columns.
///
/// Key columns holding a zero value are left out of the INSERT so the
/// database generates them; [`Save::generates_key`] reports that case.
#[derive(Debug, Clone, PartialEq)]
pub struct Save {
    pub table: String,
    pub key_columns: Vec<String>,
    pub row: Vec<(String, Value)>,
    pub on_conflict: OnConflict,
}

impl Save {
    pub fn new<I, S>(table: impl Into<String>, key_columns: &[&str], row: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let key_columns: Vec<String> = key_columns.iter().map(|c| (*c).to_string()).collect();
        let row = row
            .into_iter()
            .map(|(c, v)| (c.into(), v))
            .filter(|(c, v)| !(key_columns.contains(c) && v.is_zero()))
            .collect();
        Self {
            table: table.into(),
            key_columns,
            row,
            on_conflict: OnConflict::Fail,
        }
    }

    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    /// Overwrite every non-key column on conflict.
    pub fn update_all(self) -> Self {
        let columns = self
            .row
            .iter()
            .filter(|(c, _)| !self.key_columns.contains(c))
            .map(|(c, _)| c.clone())
            .collect();
        self.on_conflict(OnConflict::DoUpdate(columns))
    }

    /// True if a key column was left for the database to generate.
    pub fn generates_key(&self) -> bool {
        self.key_columns
            .iter()
            .any(|k| !self.row.iter().any(|(c, _)| c == k))
    }

    pub fn build(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let columns: Vec<_> = self
            .row
            .iter()
            .map(|(c, _)| dialect.quote_identifier(c))
            .collect();
        let params: Vec<Value> = self.row.iter().map(|(_, v)| v.clone()).collect();
        let placeholders: Vec<_> = (1..=params.len()).map(|i| dialect.placeholder(i)).collect();

        // An update with nothing to overwrite degrades to keeping the row.
        let on_conflict = match &self.on_conflict {
            OnConflict::DoUpdate(cols) if cols.is_empty() => &OnConflict::DoNothing,
            other => other,
        };

        let verb = if dialect == Dialect::Mysql && *on_conflict == OnConflict::DoNothing {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let mut sql = format!(
            "{} {} ({}) VALUES ({})",
            verb,
            dialect.quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        match (on_conflict, dialect) {
            (OnConflict::Fail, _) | (OnConflict::DoNothing, Dialect::Mysql) => {}
            (OnConflict::DoNothing, _) => sql.push_str(" ON CONFLICT DO NOTHING"),
            (OnConflict::DoUpdate(cols), Dialect::Mysql) => {
                let sets: Vec<_> = cols
                    .iter()
                    .map(|c| {
                        let q = dialect.quote_identifier(c);
                        format!("{q} = VALUES({q})")
                    })
                    .collect();
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                sql.push_str(&sets.join(", "));
            }
            (OnConflict::DoUpdate(cols), _) => {
                let target: Vec<_> = self
                    .key_columns
                    .iter()
                    .map(|c| dialect.quote_identifier(c))
                    .collect();
                let sets: Vec<_> = cols
                    .iter()
                    .map(|c| {
                        let q = dialect.quote_identifier(c);
                        format!("{q} = excluded.{q}")
                    })
                    .collect();
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    target.join(", "),
                    sets.join(", ")
                ));
            }
        }

        (sql, params)
    }
}
