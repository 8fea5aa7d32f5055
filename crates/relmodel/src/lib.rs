//! relmodel - relationship associations for Rust models.
//!
//! relmodel manages the relationships between mapped models:
//!
//! - Declarative relationship metadata (has-one, has-many, belongs-to and
//!   many-to-many, including polymorphic discriminators and join-table filters)
//! - Loading and counting the related values of one or many owners
//! - Appending, replacing, deleting and clearing related values while keeping
//!   foreign keys and join rows consistent
//! - Owners' relationship fields kept in step with what was persisted
//!
//! # Quick Start
//!
//! ```ignore
//! use relmodel::prelude::*;
//!
//! async fn move_posts(cx: &Cx, db: &Db<SqlExecutor<impl Connection>>) {
//!     let mut user = User { id: 1, ..User::default() };
//!
//!     let mut posts = db.association(&mut user, "posts");
//!     posts.replace(cx, vec![RelationValue::one(Post { id: 12, ..Post::default() })]).await;
//!     let count = posts.count(cx).await;
//!
//!     if let Some(err) = posts.error() {
//!         eprintln!("association failed: {err}");
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **No runtime reflection**: models expose columns and relationship fields
//!   through the `Model` trait
//! - **Structured concurrency**: every statement runs under an asupersync `Cx`
//! - **Sticky errors**: a handle keeps its first error and issues no further
//!   statements once it has one

pub use relmodel_core::{
    ColumnInfo, Connection, ConnectionError, ConnectionErrorKind, Cx, Entity, Error, FromValue,
    JoinTableInfo, Model, ModelSchema, Outcome, QueryError, QueryErrorKind, Reference,
    RelationValue, RelationshipInfo, RelationshipKind, Result, Row, SchemaError, SchemaErrorKind,
    TypeError, Value, find_relationship,
};

pub use relmodel_query::{
    ALWAYS_FALSE, ALWAYS_TRUE, BinaryOp, Delete, Dialect, Executor, Expr, Join, OnConflict, Save,
    Select, SqlExecutor, UnaryOp, Update,
};

pub use relmodel_association::{
    Association, AssociationConfig, AssociationError, OwnerSet, Scope, owner_scope,
};

pub mod db;
pub use db::Db;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Core traits and types
        Connection,
        Entity,
        Error,
        Model,
        Result,
        Row,
        Value,
        // Relationship metadata
        JoinTableInfo,
        Reference,
        RelationValue,
        RelationshipInfo,
        RelationshipKind,
        // Query layer
        Dialect,
        Executor,
        Expr,
        SqlExecutor,
        // Associations
        Association,
        AssociationConfig,
        AssociationError,
        Db,
    };
}
