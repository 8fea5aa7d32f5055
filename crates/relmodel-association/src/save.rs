//! Persisting the related values held by the owners.
//!
//! `save_association` first writes the input values into the owners'
//! relationship fields, then saves what the fields hold: the related rows,
//! the foreign keys linking them and, for many-to-many relationships, the
//! join rows. Generated keys flow back into the fields.

use crate::association::Engine;
use crate::error::AssociationError;
use crate::owners::OwnerSet;
use crate::sync::{assign_generated_key, current_items, write_back};
use asupersync::{Cx, Outcome};
use relmodel_core::{Entity, Model, RelationValue, RelationshipKind, Value};
use relmodel_query::{Executor, OnConflict, Save, Update};
use std::fmt;

impl<E: Executor> Engine<'_, E> {
    /// Set `values` on the owners and persist the relationship.
    ///
    /// With `clear` the values replace the current contents of the field,
    /// otherwise they are added to it. A collection of owners takes one value
    /// per owner, matched by position. When persisting an owner fails, that
    /// owner and the ones after it get their previous field contents back.
    pub(crate) async fn save_association<M>(
        &self,
        cx: &Cx,
        owners: &mut OwnerSet<'_, M>,
        clear: bool,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        let rel = self.rel;
        if values.is_empty() && !clear {
            return Outcome::Ok(());
        }

        let owner_count = owners.len();
        let per_owner: Vec<Vec<Box<dyn Entity>>> = if owners.is_collection() {
            if values.is_empty() {
                vec![Vec::new(); owner_count]
            } else if values.len() != owner_count {
                return Outcome::Err(AssociationError::LengthMismatch {
                    owners: owner_count,
                    values: values.len(),
                });
            } else {
                values.into_iter().map(RelationValue::into_items).collect()
            }
        } else {
            vec![values.into_iter().flat_map(RelationValue::into_items).collect()]
        };

        for item in per_owner.iter().flatten() {
            try_res!(self.check_type(&**item));
        }

        let snapshots: Vec<Vec<Box<dyn Entity>>> =
            owners.iter().map(|owner| current_items(owner, rel)).collect();
        for (owner, items) in owners.iter_mut().zip(per_owner) {
            let items = match rel.kind {
                RelationshipKind::HasOne | RelationshipKind::BelongsTo => {
                    if items.len() > 1 {
                        tracing::warn!(
                            relation = rel.name,
                            ignored = items.len() - 1,
                            "Singular relationship takes one value; ignoring the rest"
                        );
                    }
                    items.into_iter().take(1).collect()
                }
                RelationshipKind::HasMany | RelationshipKind::Many2Many => {
                    let mut merged = if clear {
                        Vec::new()
                    } else {
                        current_items(owner, rel)
                    };
                    merged.extend(items);
                    merged
                }
            };
            try_res!(write_back(owner, rel, items));
        }

        let full = owners.iter().any(Model::is_new);
        tracing::debug!(
            relation = rel.name,
            owners = owner_count,
            full,
            "Saving association"
        );
        for index in 0..owner_count {
            let Some(owner) = owners.get_mut(index) else {
                break;
            };
            let outcome = self.persist(cx, owner, full).await;
            if matches!(outcome, Outcome::Ok(())) {
                continue;
            }
            // Owners from the failed one on hold nothing that was persisted.
            let unsaved = owners.as_mut_slice().iter_mut().skip(index);
            for (owner, items) in unsaved.zip(snapshots.into_iter().skip(index)) {
                if let Err(err) = write_back(owner, rel, items) {
                    tracing::warn!(
                        relation = rel.name,
                        error = %err,
                        "Could not restore relationship field"
                    );
                }
            }
            return outcome;
        }
        Outcome::Ok(())
    }

    async fn persist<M>(&self, cx: &Cx, owner: &mut M, full: bool) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        let rel = self.rel;
        let mut items = current_items(owner, rel);
        match rel.kind {
            RelationshipKind::BelongsTo => {
                if let Some(item) = items.first_mut() {
                    try_exec!(self.save_related(cx, &mut **item, Vec::new()).await);
                    for r in rel.key_references() {
                        let key = item.read_column(r.primary_key).unwrap_or(Value::Null);
                        try_res!(owner.set_column(r.foreign_key, key));
                    }
                } else {
                    for r in rel.key_references() {
                        try_res!(owner.set_column(r.foreign_key, Value::Null));
                    }
                }
                try_res!(write_back(owner, rel, items));

                if full {
                    try_exec!(self.save_owner(cx, owner).await);
                } else {
                    let update = rel
                        .key_references()
                        .fold(Update::new(M::TABLE_NAME), |u, r| {
                            u.set(r.foreign_key, owner.column(r.foreign_key).unwrap_or(Value::Null))
                        })
                        .filter(crate::keys::to_query_values(
                            Some(M::TABLE_NAME),
                            M::PRIMARY_KEY,
                            vec![owner.primary_key_value()],
                        ));
                    let affected = try_exec!(self.executor.update_columns(cx, &update).await);
                    tracing::debug!(affected, "Updated owner foreign keys");
                }
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                if full {
                    try_exec!(self.save_owner(cx, owner).await);
                }
                let linked: Vec<String> = rel
                    .references
                    .iter()
                    .map(|r| r.foreign_key.to_string())
                    .collect();
                for item in &mut items {
                    for r in rel.references {
                        let value = match r.literal_value() {
                            Some(literal) => literal,
                            None => owner.column(r.primary_key).unwrap_or(Value::Null),
                        };
                        try_res!(item.write_column(r.foreign_key, value));
                    }
                    try_exec!(self.save_related(cx, &mut **item, linked.clone()).await);
                }
                try_res!(write_back(owner, rel, items));
            }
            RelationshipKind::Many2Many => {
                if full {
                    try_exec!(self.save_owner(cx, owner).await);
                }
                let Some(join_table) = rel.join_table else {
                    return Outcome::Ok(());
                };
                for item in &mut items {
                    try_exec!(self.save_related(cx, &mut **item, Vec::new()).await);

                    let mut row: Vec<(&str, Value)> = rel
                        .references
                        .iter()
                        .map(|r| {
                            let value = if let Some(literal) = r.literal_value() {
                                literal
                            } else if r.own_primary_key {
                                owner.column(r.primary_key).unwrap_or(Value::Null)
                            } else {
                                item.read_column(r.primary_key).unwrap_or(Value::Null)
                            };
                            (r.foreign_key, value)
                        })
                        .collect();
                    row.extend(
                        join_table
                            .filters
                            .iter()
                            .map(|(column, value)| (*column, Value::Text((*value).to_string()))),
                    );
                    let link = Save::new(join_table.table, &[], row)
                        .on_conflict(OnConflict::DoNothing);
                    try_exec!(self.executor.save(cx, &link).await);
                }
                try_res!(write_back(owner, rel, items));
            }
        }
        Outcome::Ok(())
    }

    /// Upsert the owner with every column, picking up a generated key.
    async fn save_owner<M>(&self, cx: &Cx, owner: &mut M) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        let save = Save::new(M::TABLE_NAME, M::PRIMARY_KEY, owner.to_row()).update_all();
        let id = try_exec!(self.executor.save(cx, &save).await);
        if try_res!(assign_generated_key(owner, id)) {
            tracing::debug!(table = M::TABLE_NAME, id = ?id, "Owner inserted");
        }
        Outcome::Ok(())
    }

    /// Insert a related row. An existing row keeps its values, except for
    /// `linked` columns (or every column when configured).
    async fn save_related(
        &self,
        cx: &Cx,
        item: &mut dyn Entity,
        linked: Vec<String>,
    ) -> Outcome<(), AssociationError> {
        let save = Save::new(item.table(), item.key_columns(), item.row_values());
        let save = if self.config.full_save_associations {
            save.update_all()
        } else if linked.is_empty() {
            save.on_conflict(OnConflict::DoNothing)
        } else {
            save.on_conflict(OnConflict::DoUpdate(linked))
        };
        let id = try_exec!(self.executor.save(cx, &save).await);
        if try_res!(assign_generated_key(item, id)) {
            tracing::debug!(table = item.table(), id = ?id, "Related value inserted");
        }
        Outcome::Ok(())
    }
}
