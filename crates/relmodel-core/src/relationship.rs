//! Relationship metadata for relmodel.
//!
//! Relationships are declared statically on each `Model` (`Model::RELATIONSHIPS`)
//! with const builders, so the association engine can build conditions and
//! mutations without runtime reflection.

use crate::error::{Error, TypeError};
use crate::model::{Entity, Model};
use crate::value::Value;
use crate::Result;
use std::any::TypeId;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one, foreign key on the related table: `User` has one `Profile`.
    HasOne,
    /// One-to-many, foreign key on the related table: `User` has many `Post`s.
    HasMany,
    /// Many-to-one, foreign key on the owner table: `Post` belongs to `User`.
    BelongsTo,
    /// Many-to-many via a join table: `User`s have many `Tag`s.
    Many2Many,
}

impl RelationshipKind {
    /// Whether the relationship field holds a collection.
    pub const fn is_collection(self) -> bool {
        matches!(self, RelationshipKind::HasMany | RelationshipKind::Many2Many)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::HasOne => "has_one",
            RelationshipKind::HasMany => "has_many",
            RelationshipKind::BelongsTo => "belongs_to",
            RelationshipKind::Many2Many => "many2many",
        }
    }
}

/// One key correspondence of a relationship.
///
/// Which table `primary_key` and `foreign_key` live on depends on the kind:
///
/// | kind | `primary_key` | `foreign_key` |
/// |------|---------------|---------------|
/// | HasOne / HasMany | owner | related |
/// | BelongsTo | related | owner |
/// | Many2Many, `own_primary_key` | owner | join table |
/// | Many2Many, related group | related | join table |
///
/// A reference with `primary_value` set is a discriminator: the literal is
/// written to (and filtered on) `foreign_key`, and `primary_key` is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub primary_key: &'static str,
    pub foreign_key: &'static str,
    /// True when the owner side holds `primary_key`.
    pub own_primary_key: bool,
    pub primary_value: Option<&'static str>,
}

impl Reference {
    /// The owner holds the primary key; the foreign key lives on the other side.
    pub const fn owned(primary_key: &'static str, foreign_key: &'static str) -> Self {
        Self {
            primary_key,
            foreign_key,
            own_primary_key: true,
            primary_value: None,
        }
    }

    /// The owner holds the foreign key (BelongsTo), or the reference belongs
    /// to the related-side group of a many-to-many join.
    pub const fn foreign(primary_key: &'static str, foreign_key: &'static str) -> Self {
        Self {
            primary_key,
            foreign_key,
            own_primary_key: false,
            primary_value: None,
        }
    }

    /// A fixed discriminator value written to `foreign_key`.
    pub const fn literal(foreign_key: &'static str, value: &'static str) -> Self {
        Self {
            primary_key: "",
            foreign_key,
            own_primary_key: false,
            primary_value: Some(value),
        }
    }

    pub const fn is_literal(&self) -> bool {
        self.primary_value.is_some()
    }

    /// The discriminator as a `Value`, if this is a literal reference.
    pub fn literal_value(&self) -> Option<Value> {
        self.primary_value.map(|v| Value::Text(v.to_string()))
    }
}

/// Join table of a many-to-many relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTableInfo {
    pub table: &'static str,
    /// Extra `column = literal` clauses applied to every statement touching
    /// the join table, and written into every inserted join row.
    pub filters: &'static [(&'static str, &'static str)],
}

impl JoinTableInfo {
    pub const fn new(table: &'static str) -> Self {
        Self { table, filters: &[] }
    }

    #[must_use]
    pub const fn filters(mut self, filters: &'static [(&'static str, &'static str)]) -> Self {
        self.filters = filters;
        self
    }
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relationship field on the owner.
    pub name: &'static str,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Ordered key correspondences.
    pub references: &'static [Reference],

    /// The related model's table name.
    pub related_table: &'static str,

    /// The related model's primary key column(s).
    pub related_primary_key: &'static [&'static str],

    /// Runtime identity of the related model type.
    ///
    /// Stored as a function pointer so the metadata stays const-constructible.
    pub related_type: fn() -> TypeId,

    /// Rust name of the related model type.
    pub related_type_name: fn() -> &'static str,

    /// Join table for Many2Many relationships.
    pub join_table: Option<JoinTableInfo>,
}

impl PartialEq for RelationshipInfo {
    fn eq(&self, other: &Self) -> bool {
        // Function pointers are compared through what they return.
        self.name == other.name
            && self.kind == other.kind
            && self.references == other.references
            && self.related_table == other.related_table
            && self.related_primary_key == other.related_primary_key
            && (self.related_type)() == (other.related_type)()
            && self.join_table == other.join_table
    }
}

impl Eq for RelationshipInfo {}

fn unit_type_id() -> TypeId {
    TypeId::of::<()>()
}

fn unit_type_name() -> &'static str {
    "()"
}

impl RelationshipInfo {
    /// Create a new relationship with required fields.
    #[must_use]
    pub const fn new(name: &'static str, kind: RelationshipKind) -> Self {
        Self {
            name,
            kind,
            references: &[],
            related_table: "",
            related_primary_key: &[],
            related_type: unit_type_id,
            related_type_name: unit_type_name,
            join_table: None,
        }
    }

    /// Set the related model. Fills table, primary key and type identity.
    #[must_use]
    pub const fn related<T: Model>(mut self) -> Self {
        self.related_table = T::TABLE_NAME;
        self.related_primary_key = T::PRIMARY_KEY;
        self.related_type = TypeId::of::<T>;
        self.related_type_name = std::any::type_name::<T>;
        self
    }

    #[must_use]
    pub const fn references(mut self, references: &'static [Reference]) -> Self {
        self.references = references;
        self
    }

    #[must_use]
    pub const fn join_table(mut self, info: JoinTableInfo) -> Self {
        self.join_table = Some(info);
        self
    }

    /// Whether `entity` is an instance of the related model.
    pub fn accepts(&self, entity: &dyn Entity) -> bool {
        entity.as_any().type_id() == (self.related_type)()
    }

    /// References that carry entity values (not discriminator literals).
    pub fn key_references(&self) -> impl Iterator<Item = &'static Reference> {
        self.references.iter().filter(|r| !r.is_literal())
    }

    /// Discriminator references.
    pub fn literal_references(&self) -> impl Iterator<Item = &'static Reference> {
        self.references.iter().filter(|r| r.is_literal())
    }
}

/// Find a relationship by field name in a model's RELATIONSHIPS.
pub fn find_relationship<M: Model>(field_name: &str) -> Option<&'static RelationshipInfo> {
    M::RELATIONSHIPS.iter().find(|r| r.name == field_name)
}

/// The in-memory value of one relationship field.
///
/// Also the input of `append`/`replace`/`delete`: a `Many` input is unwrapped
/// into its items.
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// A singular field (HasOne / BelongsTo).
    One(Option<Box<dyn Entity>>),
    /// A collection field (HasMany / Many2Many).
    Many(Vec<Box<dyn Entity>>),
}

impl RelationValue {
    pub fn one<T: Entity>(item: T) -> Self {
        RelationValue::One(Some(Box::new(item)))
    }

    pub fn optional<T: Entity>(item: Option<T>) -> Self {
        RelationValue::One(item.map(|v| Box::new(v) as Box<dyn Entity>))
    }

    pub fn none() -> Self {
        RelationValue::One(None)
    }

    pub fn many<T: Entity>(items: impl IntoIterator<Item = T>) -> Self {
        RelationValue::Many(
            items
                .into_iter()
                .map(|v| Box::new(v) as Box<dyn Entity>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// View the held values as a slice (zero or one item for `One`).
    pub fn as_slice(&self) -> &[Box<dyn Entity>] {
        match self {
            RelationValue::One(Some(item)) => std::slice::from_ref(item),
            RelationValue::One(None) => &[],
            RelationValue::Many(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<Box<dyn Entity>> {
        match self {
            RelationValue::One(item) => item.into_iter().collect(),
            RelationValue::Many(items) => items,
        }
    }

    /// Take the first held value as a concrete model.
    #[allow(clippy::result_large_err)]
    pub fn into_one<T: Model>(self) -> Result<Option<T>> {
        self.into_items().into_iter().next().map(downcast).transpose()
    }

    /// Take every held value as a concrete model.
    #[allow(clippy::result_large_err)]
    pub fn into_many<T: Model>(self) -> Result<Vec<T>> {
        self.into_items().into_iter().map(downcast).collect()
    }
}

impl From<Box<dyn Entity>> for RelationValue {
    fn from(item: Box<dyn Entity>) -> Self {
        RelationValue::One(Some(item))
    }
}

impl From<Vec<Box<dyn Entity>>> for RelationValue {
    fn from(items: Vec<Box<dyn Entity>>) -> Self {
        RelationValue::Many(items)
    }
}

#[allow(clippy::result_large_err)]
fn downcast<T: Model>(item: Box<dyn Entity>) -> Result<T> {
    let found = item.type_name();
    item.into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: found.to_string(),
                column: None,
            })
        })
}
