//! Keeping owners' relationship fields in step with persisted changes.

use crate::keys::{IdentityMap, entity_key};
use relmodel_core::{
    Entity, Model, RelationValue, RelationshipInfo, RelationshipKind, Result, Value,
};

/// The related values currently held in the owner's relationship field.
pub fn current_items<M: Model>(owner: &M, rel: &RelationshipInfo) -> Vec<Box<dyn Entity>> {
    owner
        .relation(rel.name)
        .map(RelationValue::into_items)
        .unwrap_or_default()
}

/// Overwrite the owner's relationship field with `items`.
///
/// Singular relationships keep the first item.
#[allow(clippy::result_large_err)]
pub fn write_back<M: Model>(
    owner: &mut M,
    rel: &RelationshipInfo,
    items: Vec<Box<dyn Entity>>,
) -> Result<()> {
    let value = if rel.kind.is_collection() {
        RelationValue::Many(items)
    } else {
        RelationValue::One(items.into_iter().next())
    };
    owner.set_relation(rel.name, value)
}

/// Remove deleted related values from an owner.
///
/// `columns` are the related-side identity columns the deletion matched on
/// and `deleted` the identities that were deleted. For a BelongsTo
/// relationship the owner's foreign key columns are nulled as well when they
/// referenced a deleted value. Returns how many values left the field.
#[allow(clippy::result_large_err)]
pub fn remove_deleted<M: Model>(
    owner: &mut M,
    rel: &RelationshipInfo,
    columns: &[&str],
    deleted: &IdentityMap,
) -> Result<usize> {
    let items = current_items(owner, rel);
    let before = items.len();
    let kept: Vec<Box<dyn Entity>> = items
        .into_iter()
        .filter(|item| !deleted.contains(&entity_key(&**item, columns)))
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        write_back(owner, rel, kept)?;
    }

    if rel.kind == RelationshipKind::BelongsTo {
        let foreign_keys: Vec<&str> = rel.key_references().map(|r| r.foreign_key).collect();
        let held: Vec<Value> = foreign_keys
            .iter()
            .map(|col| owner.column(col).unwrap_or(Value::Null))
            .collect();
        if deleted.contains(&held) {
            for col in foreign_keys {
                owner.set_column(col, Value::Null)?;
            }
        }
    }
    Ok(removed)
}

/// Store a database-generated key on an entity with a single key column.
///
/// Returns whether a key was written.
#[allow(clippy::result_large_err)]
pub fn assign_generated_key(entity: &mut dyn Entity, id: Option<i64>) -> Result<bool> {
    match (id, entity.key_columns()) {
        (Some(id), [column]) => {
            entity.write_column(column, Value::BigInt(id))?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
