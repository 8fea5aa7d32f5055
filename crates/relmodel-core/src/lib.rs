//! Core types and traits for relmodel.
//!
//! This crate provides the foundational abstractions the association engine
//! is written against:
//!
//! - `Model` trait: table mapping plus the field-access capability
//!   (read/write a named column or relationship field)
//! - `Entity` / `RelationValue`: type-erased related values
//! - Relationship metadata (`RelationshipInfo`, `Reference`, `JoinTableInfo`)
//! - `ModelSchema`: resolved and validated per-model schema
//! - `Connection` trait for database connections
//! - `Outcome` / `Cx` re-exports from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod model;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::Connection;
pub use error::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result, SchemaError,
    SchemaErrorKind, TypeError,
};
pub use model::{Entity, Model};
pub use relationship::{
    JoinTableInfo, Reference, RelationValue, RelationshipInfo, RelationshipKind,
    find_relationship,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::ModelSchema;
pub use value::Value;
