//! The association handle and the mutation engine behind it.
//!
//! A handle is bound to one relationship of the owner model, one set of
//! owner instances and one executor. Operations build statements from the
//! relationship metadata, run them through the executor and then bring the
//! owners' relationship fields in line with what was persisted.

use crate::conditions::{filter_conditions, join_table_scope, literal_conditions, owner_scope};
use crate::config::AssociationConfig;
use crate::error::AssociationError;
use crate::keys::{entity_key, identity_values, to_excluded_values, to_query_values};
use crate::owners::OwnerSet;
use crate::sync::{current_items, remove_deleted};
use asupersync::{Cx, Outcome};
use relmodel_core::{
    Entity, Error, Model, ModelSchema, Reference, RelationValue, RelationshipInfo,
    RelationshipKind, Value,
};
use relmodel_query::{Delete, Executor, Expr, Update};
use std::any::TypeId;
use std::fmt;

/// A relationship of one or more owners, ready to be queried or mutated.
///
/// The first error any operation runs into is kept. From then on every
/// operation returns that error without issuing statements; a later
/// successful call never clears it.
///
/// # Example
///
/// ```ignore
/// let mut user = User { id: 1, ..User::default() };
/// let mut posts = Association::bind(&executor, OwnerSet::One(&mut user), "posts");
/// posts.append(&cx, vec![RelationValue::one(Post::new("hello"))]).await;
/// let count = posts.count(&cx).await;
/// ```
pub struct Association<'a, M, E> {
    executor: &'a E,
    owners: OwnerSet<'a, M>,
    relationship: Option<&'static RelationshipInfo>,
    config: AssociationConfig,
    error: Option<AssociationError>,
}

impl<M: fmt::Debug, E> fmt::Debug for Association<'_, M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("owners", &self.owners)
            .field("relationship", &self.relationship.map(|r| r.name))
            .field("config", &self.config)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<'a, M, E> Association<'a, M, E>
where
    M: Model + Clone + fmt::Debug,
    E: Executor,
{
    /// Bind the relationship `name` of `M` to `owners`.
    ///
    /// An unknown name or invalid relationship declarations do not fail here;
    /// they become the handle's error and are reported by every operation.
    pub fn bind(executor: &'a E, owners: OwnerSet<'a, M>, name: &str) -> Self {
        let mut association = Self {
            executor,
            owners,
            relationship: None,
            config: AssociationConfig::default(),
            error: None,
        };
        match ModelSchema::resolve::<M>() {
            Ok(schema) => match schema.relationship(name) {
                Some(rel) => association.relationship = Some(rel),
                None => {
                    association.fail(AssociationError::UnresolvedRelationship {
                        model: M::TABLE_NAME,
                        name: name.to_string(),
                    });
                }
            },
            Err(err) => {
                let message = match err {
                    Error::Schema(schema) => schema.message,
                    other => other.to_string(),
                };
                association.fail(AssociationError::Schema(message));
            }
        }
        association
    }

    #[must_use]
    pub fn with_config(mut self, config: AssociationConfig) -> Self {
        self.config = config;
        self
    }

    /// The first error this handle ran into.
    pub fn error(&self) -> Option<&AssociationError> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<AssociationError> {
        self.error
    }

    /// The bound relationship, if it resolved.
    pub fn relationship(&self) -> Option<&'static RelationshipInfo> {
        self.relationship
    }

    pub fn owners(&self) -> &[M] {
        self.owners.as_slice()
    }

    fn relation_name(&self) -> &'static str {
        self.relationship.map_or("", |r| r.name)
    }

    /// Load the related values of every owner.
    ///
    /// `extra` conditions are ANDed with the relationship scope. `R` must be
    /// the related model.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, extra),
        fields(model = M::TABLE_NAME, relation = self.relation_name())
    )]
    pub async fn find<R: Model>(
        &mut self,
        cx: &Cx,
        extra: Vec<Expr>,
    ) -> Outcome<Vec<R>, AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.find(cx, &self.owners, extra).await;
        self.record(outcome)
    }

    /// Add related values, keeping the ones already associated.
    ///
    /// On a singular relationship this replaces the current value. With no
    /// values nothing is issued at all: a new owner is not saved either.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, values),
        fields(model = M::TABLE_NAME, relation = self.relation_name(), values = values.len())
    )]
    pub async fn append(
        &mut self,
        cx: &Cx,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.append(cx, &mut self.owners, values).await;
        self.record(outcome)
    }

    /// Make `values` the complete set of related values.
    ///
    /// Related rows that drop out of the relationship have their foreign key
    /// nulled (or their join rows deleted); they are never deleted.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, values),
        fields(model = M::TABLE_NAME, relation = self.relation_name(), values = values.len())
    )]
    pub async fn replace(
        &mut self,
        cx: &Cx,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.replace(cx, &mut self.owners, values).await;
        self.record(outcome)
    }

    /// Dissociate `values` from the owners.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, values),
        fields(model = M::TABLE_NAME, relation = self.relation_name(), values = values.len())
    )]
    pub async fn delete(
        &mut self,
        cx: &Cx,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.delete(cx, &mut self.owners, values).await;
        self.record(outcome)
    }

    /// Dissociate every related value.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx),
        fields(model = M::TABLE_NAME, relation = self.relation_name())
    )]
    pub async fn clear(&mut self, cx: &Cx) -> Outcome<(), AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.replace(cx, &mut self.owners, Vec::new()).await;
        self.record(outcome)
    }

    /// Count the related rows of every owner.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx),
        fields(model = M::TABLE_NAME, relation = self.relation_name())
    )]
    pub async fn count(&mut self, cx: &Cx) -> Outcome<u64, AssociationError> {
        let rel = match self.ready() {
            Ok(rel) => rel,
            Err(err) => return Outcome::Err(err),
        };
        let engine = Engine::new(self.executor, rel, &self.config);
        let outcome = engine.count(cx, &self.owners).await;
        self.record(outcome)
    }

    fn ready(&self) -> Result<&'static RelationshipInfo, AssociationError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.relationship
            .ok_or_else(|| AssociationError::Schema("no relationship bound".to_string()))
    }

    fn record<T>(&mut self, outcome: Outcome<T, AssociationError>) -> Outcome<T, AssociationError> {
        match outcome {
            Outcome::Ok(value) => Outcome::Ok(value),
            Outcome::Err(err) => Outcome::Err(self.fail(err)),
            Outcome::Cancelled(reason) => {
                self.fail(AssociationError::Aborted(format!("cancelled: {reason:?}")));
                Outcome::Cancelled(reason)
            }
            Outcome::Panicked(payload) => {
                self.fail(AssociationError::Aborted(format!("panicked: {payload:?}")));
                Outcome::Panicked(payload)
            }
        }
    }

    /// Keep `err` unless an earlier error is already stored; return the
    /// stored one.
    fn fail(&mut self, err: AssociationError) -> AssociationError {
        if let Some(first) = &self.error {
            return first.clone();
        }
        tracing::warn!(
            model = M::TABLE_NAME,
            relation = self.relation_name(),
            error = %err,
            "Association error recorded"
        );
        self.error = Some(err.clone());
        err
    }
}

/// Statement building and execution for one bound relationship.
pub(crate) struct Engine<'e, E> {
    pub(crate) executor: &'e E,
    pub(crate) rel: &'static RelationshipInfo,
    pub(crate) config: &'e AssociationConfig,
}

pub(crate) fn owner_refs<'o, M: Entity>(owners: &'o OwnerSet<'_, M>) -> Vec<&'o dyn Entity> {
    owners.iter().map(|o| o as &dyn Entity).collect()
}

/// Split key references into (this-side columns, other-side columns).
fn columns(
    refs: impl Iterator<Item = &'static Reference>,
) -> (Vec<&'static str>, Vec<&'static str>) {
    refs.map(|r| (r.primary_key, r.foreign_key)).unzip()
}

impl<'e, E: Executor> Engine<'e, E> {
    pub(crate) fn new(
        executor: &'e E,
        rel: &'static RelationshipInfo,
        config: &'e AssociationConfig,
    ) -> Self {
        Self {
            executor,
            rel,
            config,
        }
    }

    pub(crate) fn check_type(&self, entity: &dyn Entity) -> Result<(), AssociationError> {
        if self.rel.accepts(entity) {
            Ok(())
        } else {
            Err(AssociationError::UnsupportedDataType {
                found: entity.type_name(),
                relation: self.rel.name,
            })
        }
    }

    fn check_target<R: Model>(&self) -> Result<(), AssociationError> {
        if TypeId::of::<R>() == (self.rel.related_type)() {
            Ok(())
        } else {
            Err(AssociationError::UnsupportedDataType {
                found: std::any::type_name::<R>(),
                relation: self.rel.name,
            })
        }
    }

    async fn find<M, R>(
        &self,
        cx: &Cx,
        owners: &OwnerSet<'_, M>,
        extra: Vec<Expr>,
    ) -> Outcome<Vec<R>, AssociationError>
    where
        M: Model + Clone + fmt::Debug,
        R: Model,
    {
        try_res!(self.check_target::<R>());
        let select = owner_scope(self.rel, &owner_refs(owners)).into_select(extra);
        let rows = try_exec!(self.executor.fetch(cx, &select).await);
        let related = try_res!(
            rows.iter()
                .map(R::from_row)
                .collect::<relmodel_core::Result<Vec<R>>>()
        );
        tracing::debug!(count = related.len(), "Loaded related values");
        Outcome::Ok(related)
    }

    async fn count<M>(&self, cx: &Cx, owners: &OwnerSet<'_, M>) -> Outcome<u64, AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        let select = owner_scope(self.rel, &owner_refs(owners)).into_select(Vec::new());
        let count = try_exec!(self.executor.count(cx, &select).await);
        Outcome::Ok(count)
    }

    async fn append<M>(
        &self,
        cx: &Cx,
        owners: &mut OwnerSet<'_, M>,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        match self.rel.kind {
            RelationshipKind::HasOne | RelationshipKind::BelongsTo => {
                if values.is_empty() {
                    return Outcome::Ok(());
                }
                self.replace(cx, owners, values).await
            }
            RelationshipKind::HasMany | RelationshipKind::Many2Many => {
                self.save_association(cx, owners, false, values).await
            }
        }
    }

    async fn replace<M>(
        &self,
        cx: &Cx,
        owners: &mut OwnerSet<'_, M>,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        try_exec!(self.save_association(cx, owners, true, values).await);

        let rel = self.rel;
        match rel.kind {
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                let (owner_columns, foreign_keys) = columns(rel.key_references());
                let (_, owner_keys) = identity_values(owner_refs(owners), &owner_columns);
                let kept: Vec<Box<dyn Entity>> = owners
                    .iter()
                    .flat_map(|owner| current_items(owner, rel))
                    .collect();
                let (_, kept_keys) =
                    identity_values(kept.iter().map(|b| &**b), rel.related_primary_key);

                let mut update = foreign_keys
                    .iter()
                    .fold(Update::new(rel.related_table), |u, fk| {
                        u.set(*fk, Value::Null)
                    })
                    .filter(to_query_values(
                        Some(rel.related_table),
                        &foreign_keys,
                        owner_keys,
                    ));
                for cond in literal_conditions(rel, rel.related_table) {
                    update = update.filter(cond);
                }
                update = update.filter(to_excluded_values(
                    Some(rel.related_table),
                    rel.related_primary_key,
                    kept_keys,
                ));
                let affected = try_exec!(self.executor.update_columns(cx, &update).await);
                tracing::debug!(affected, "Detached replaced related rows");
            }
            RelationshipKind::Many2Many => {
                let Some(join_table) = rel.join_table else {
                    return Outcome::Ok(());
                };
                let (owner_columns, join_owner_columns) =
                    columns(rel.key_references().filter(|r| r.own_primary_key));
                let (related_columns, join_related_columns) =
                    columns(rel.key_references().filter(|r| !r.own_primary_key));

                let per_owner = owners.iter().map(|owner| {
                    let owner_key = entity_key(owner, &owner_columns);
                    let items = current_items(owner, rel);
                    let (_, related_keys) =
                        identity_values(items.iter().map(|b| &**b), &related_columns);
                    to_query_values(Some(join_table.table), &join_owner_columns, vec![owner_key])
                        .and(to_excluded_values(
                            Some(join_table.table),
                            &join_related_columns,
                            related_keys,
                        ))
                });
                let stale = Expr::or_all(per_owner);

                let delete = literal_conditions(rel, join_table.table)
                    .into_iter()
                    .chain(filter_conditions(join_table))
                    .chain(std::iter::once(stale))
                    .fold(Delete::new(join_table.table), Delete::filter);
                let affected = try_exec!(self.executor.delete(cx, &delete).await);
                tracing::debug!(affected, "Removed replaced join rows");
            }
            RelationshipKind::BelongsTo => {}
        }
        Outcome::Ok(())
    }

    async fn delete<M>(
        &self,
        cx: &Cx,
        owners: &mut OwnerSet<'_, M>,
        values: Vec<RelationValue>,
    ) -> Outcome<(), AssociationError>
    where
        M: Model + Clone + fmt::Debug,
    {
        let rel = self.rel;
        let items: Vec<Box<dyn Entity>> = values
            .into_iter()
            .flat_map(RelationValue::into_items)
            .collect();
        for item in &items {
            try_res!(self.check_type(&**item));
        }

        // Related-side columns identifying the deleted values.
        let identity_columns: Vec<&'static str> = match rel.kind {
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                rel.related_primary_key.to_vec()
            }
            RelationshipKind::BelongsTo | RelationshipKind::Many2Many => rel
                .key_references()
                .filter(|r| !r.own_primary_key)
                .map(|r| r.primary_key)
                .collect(),
        };
        let (deleted, deleted_keys) =
            identity_values(items.iter().map(|b| &**b), &identity_columns);

        match rel.kind {
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                let foreign_keys: Vec<&str> = rel.key_references().map(|r| r.foreign_key).collect();
                let scope = owner_scope(rel, &owner_refs(owners));
                let update = foreign_keys
                    .iter()
                    .fold(Update::new(rel.related_table), |u, fk| {
                        u.set(*fk, Value::Null)
                    });
                let update = scope
                    .conditions
                    .into_iter()
                    .chain(std::iter::once(to_query_values(
                        Some(rel.related_table),
                        &identity_columns,
                        deleted_keys,
                    )))
                    .fold(update, Update::filter);
                let affected = try_exec!(self.executor.update_columns(cx, &update).await);
                tracing::debug!(affected, "Detached deleted related rows");
            }
            RelationshipKind::BelongsTo => {
                let foreign_keys: Vec<&str> = rel.key_references().map(|r| r.foreign_key).collect();
                let (_, owner_keys) = identity_values(owner_refs(owners), M::PRIMARY_KEY);
                let update = foreign_keys
                    .iter()
                    .fold(Update::new(M::TABLE_NAME), |u, fk| u.set(*fk, Value::Null))
                    .filter(to_query_values(
                        Some(M::TABLE_NAME),
                        M::PRIMARY_KEY,
                        owner_keys,
                    ))
                    .filter(to_query_values(
                        Some(M::TABLE_NAME),
                        &foreign_keys,
                        deleted_keys,
                    ));
                let affected = try_exec!(self.executor.update_columns(cx, &update).await);
                tracing::debug!(affected, "Cleared owner foreign keys");
            }
            RelationshipKind::Many2Many => {
                let Some(scope) = join_table_scope(rel, &owner_refs(owners)) else {
                    return Outcome::Ok(());
                };
                let join_related_columns: Vec<&str> = rel
                    .key_references()
                    .filter(|r| !r.own_primary_key)
                    .map(|r| r.foreign_key)
                    .collect();
                let delete = scope
                    .conditions
                    .into_iter()
                    .chain(std::iter::once(to_query_values(
                        Some(scope.table),
                        &join_related_columns,
                        deleted_keys,
                    )))
                    .fold(Delete::new(scope.table), Delete::filter);
                let affected = try_exec!(self.executor.delete(cx, &delete).await);
                tracing::debug!(affected, "Removed deleted join rows");
            }
        }

        let mut removed = 0;
        for owner in owners.iter_mut() {
            removed += try_res!(remove_deleted(owner, rel, &identity_columns, &deleted));
        }
        tracing::debug!(removed, "Synchronized owners after delete");
        Outcome::Ok(())
    }
}
