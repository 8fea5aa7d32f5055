//! Model trait for ORM-style struct mapping.
//!
//! The `Model` trait defines the contract for structs that can be mapped to
//! database tables, including the field-access capability the association
//! engine relies on: reading and writing a named column, and reading and
//! writing a named relationship field. Implementations are written (or
//! generated) once per model; nothing is discovered at runtime.
//!
//! `Entity` is the object-safe face of a `Model`, used wherever related
//! values of a type unknown to the caller have to be carried around.

use crate::Result;
use crate::error::{Error, SchemaErrorKind};
use crate::relationship::{RelationValue, RelationshipInfo};
use crate::row::Row;
use crate::value::Value;
use std::any::Any;
use std::fmt;

/// Trait for types that can be mapped to database tables.
///
/// # Example
///
/// ```ignore
/// use relmodel::prelude::*;
///
/// #[derive(Debug, Clone, Default)]
/// struct Post {
///     id: i64,
///     user_id: Option<i64>,
///     title: String,
/// }
///
/// impl Model for Post {
///     const TABLE_NAME: &'static str = "posts";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![
///             ("id", Value::BigInt(self.id)),
///             ("user_id", Value::from(self.user_id)),
///             ("title", Value::Text(self.title.clone())),
///         ]
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get_named("id")?,
///             user_id: row.get_named("user_id")?,
///             title: row.get_named("title")?,
///         })
///     }
///
///     fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
///         match name {
///             "id" => self.id = value.try_into()?,
///             "user_id" => self.user_id = value.try_into()?,
///             "title" => self.title = value.try_into()?,
///             other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Relationship metadata for this model.
    ///
    /// Models with no relationships can rely on the default empty slice.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Convert this model instance to a row of values.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Write one column value into this instance.
    #[allow(clippy::result_large_err)]
    fn set_column(&mut self, name: &str, value: Value) -> Result<()>;

    /// Read one column value from this instance.
    fn column(&self, name: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value)
    }

    /// Get the value of the primary key field(s), in `PRIMARY_KEY` order.
    fn primary_key_value(&self) -> Vec<Value> {
        Self::PRIMARY_KEY
            .iter()
            .map(|col| self.column(col).unwrap_or(Value::Null))
            .collect()
    }

    /// Check if this is a new record (every primary key column is zero or NULL).
    fn is_new(&self) -> bool {
        self.primary_key_value().iter().all(Value::is_zero)
    }

    /// Read the current value of a relationship field.
    ///
    /// Returns `None` if this model has no relationship field with that name.
    fn relation(&self, _name: &str) -> Option<RelationValue> {
        None
    }

    /// Overwrite a relationship field.
    #[allow(clippy::result_large_err)]
    fn set_relation(&mut self, name: &str, _value: RelationValue) -> Result<()> {
        Err(Error::schema(
            SchemaErrorKind::RelationshipNotFound,
            format!(
                "model '{}' has no relationship field '{}'",
                Self::TABLE_NAME,
                name
            ),
        ))
    }
}

/// Object-safe view of a `Model` instance.
///
/// Every `Model + Clone + Debug` is an `Entity` through the blanket impl
/// below; the engine never implements this by hand.
pub trait Entity: Any + Send + Sync + fmt::Debug {
    /// Table the entity maps to.
    fn table(&self) -> &'static str;

    /// Rust type name, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Primary key column names.
    fn key_columns(&self) -> &'static [&'static str];

    /// Primary key values, in `key_columns` order.
    fn key_values(&self) -> Vec<Value>;

    /// True if the primary key is zero, i.e. the row was never inserted.
    fn is_transient(&self) -> bool;

    /// All persisted column values.
    fn row_values(&self) -> Vec<(&'static str, Value)>;

    /// Read a column by name.
    fn read_column(&self, name: &str) -> Option<Value>;

    /// Write a column by name.
    #[allow(clippy::result_large_err)]
    fn write_column(&mut self, name: &str, value: Value) -> Result<()>;

    fn clone_boxed(&self) -> Box<dyn Entity>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<M> Entity for M
where
    M: Model + Clone + fmt::Debug,
{
    fn table(&self) -> &'static str {
        M::TABLE_NAME
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn key_columns(&self) -> &'static [&'static str] {
        M::PRIMARY_KEY
    }

    fn key_values(&self) -> Vec<Value> {
        self.primary_key_value()
    }

    fn is_transient(&self) -> bool {
        self.is_new()
    }

    fn row_values(&self) -> Vec<(&'static str, Value)> {
        self.to_row()
    }

    fn read_column(&self, name: &str) -> Option<Value> {
        self.column(name)
    }

    fn write_column(&mut self, name: &str, value: Value) -> Result<()> {
        self.set_column(name, value)
    }

    fn clone_boxed(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}
