//! Resolved, validated per-model schema.

use crate::Result;
use crate::error::{Error, SchemaErrorKind};
use crate::model::Model;
use crate::relationship::{RelationshipInfo, RelationshipKind};

/// Schema of one model: table, primary key and validated relationships.
#[derive(Debug, Clone, Copy)]
pub struct ModelSchema {
    pub table: &'static str,
    pub primary_key: &'static [&'static str],
    pub relationships: &'static [RelationshipInfo],
}

impl ModelSchema {
    /// Resolve and validate the schema of `M`.
    #[allow(clippy::result_large_err)]
    pub fn resolve<M: Model>() -> Result<Self> {
        let schema = Self {
            table: M::TABLE_NAME,
            primary_key: M::PRIMARY_KEY,
            relationships: M::RELATIONSHIPS,
        };
        schema.validate()?;
        tracing::trace!(
            table = schema.table,
            relationships = schema.relationships.len(),
            "Resolved model schema"
        );
        Ok(schema)
    }

    /// Look up a relationship by field name.
    pub fn relationship(&self, name: &str) -> Option<&'static RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        if self.primary_key.is_empty() {
            return Err(self.invalid("declares no primary key"));
        }

        for (i, rel) in self.relationships.iter().enumerate() {
            if self.relationships[..i].iter().any(|r| r.name == rel.name) {
                return Err(self.invalid(&format!(
                    "declares relationship '{}' more than once",
                    rel.name
                )));
            }
            self.validate_relationship(rel)?;
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_relationship(&self, rel: &RelationshipInfo) -> Result<()> {
        let fail = |msg: &str| self.invalid(&format!("relationship '{}' {}", rel.name, msg));

        if rel.key_references().next().is_none() {
            return Err(fail("has no key references"));
        }
        if rel.related_table.is_empty() || rel.related_primary_key.is_empty() {
            return Err(fail("has no related model"));
        }

        match rel.kind {
            RelationshipKind::Many2Many => {
                if rel.join_table.is_none() {
                    return Err(fail("is many2many but has no join table"));
                }
                let owner_side = rel.key_references().filter(|r| r.own_primary_key).count();
                let related_side = rel.key_references().filter(|r| !r.own_primary_key).count();
                if owner_side == 0 || related_side == 0 {
                    return Err(fail(
                        "needs both owner-side and related-side join references",
                    ));
                }
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                if rel.join_table.is_some() {
                    return Err(fail("has a join table but is not many2many"));
                }
                if rel.key_references().any(|r| !r.own_primary_key) {
                    return Err(fail("has a reference not driven by the owner primary key"));
                }
            }
            RelationshipKind::BelongsTo => {
                if rel.join_table.is_some() {
                    return Err(fail("has a join table but is not many2many"));
                }
                if rel.key_references().any(|r| r.own_primary_key) {
                    return Err(fail("has a reference driven by the owner primary key"));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, msg: &str) -> Error {
        Error::schema(
            SchemaErrorKind::Invalid,
            format!("model '{}' {}", self.table, msg),
        )
    }
}
