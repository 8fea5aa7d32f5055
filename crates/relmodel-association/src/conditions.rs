//! Conditions selecting the related rows of a set of owners.

use crate::keys::{identity_values, to_query_values};
use relmodel_core::{Entity, JoinTableInfo, RelationshipInfo, Value};
use relmodel_query::{ALWAYS_TRUE, Expr, Join, Select};

/// Table, conditions and optional join scoping a relationship to its owners.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub table: &'static str,
    pub conditions: Vec<Expr>,
    pub join: Option<Join>,
}

impl Scope {
    /// SELECT over the scope, with extra conditions ANDed in.
    pub fn into_select(self, extra: impl IntoIterator<Item = Expr>) -> Select {
        let mut select = Select::new(self.table);
        if let Some(join) = self.join {
            select = select.join(join);
        }
        self.conditions
            .into_iter()
            .chain(extra)
            .fold(select, Select::filter)
    }
}

/// Scope of the rows a Find or Count over `rel` reads.
///
/// Many-to-many relationships read the related table joined with the join
/// table; every other kind reads the related table directly.
pub fn owner_scope(rel: &RelationshipInfo, owners: &[&dyn Entity]) -> Scope {
    match rel.join_table {
        Some(join_table) => {
            let related_refs = rel.key_references().filter(|r| !r.own_primary_key);
            let on = Expr::and_all(related_refs.map(|r| {
                Expr::qualified(join_table.table, r.foreign_key)
                    .eq(Expr::qualified(rel.related_table, r.primary_key))
            }))
            .unwrap_or_else(|| Expr::raw(ALWAYS_TRUE));
            Scope {
                table: rel.related_table,
                conditions: join_table_conditions(rel, join_table, owners),
                join: Some(Join::inner(join_table.table, on)),
            }
        }
        None => direct_scope(rel, owners),
    }
}

/// Scope of the join rows owned by `owners`, for statements that act on
/// the join table itself.
///
/// Returns `None` when the relationship has no join table.
pub fn join_table_scope(rel: &RelationshipInfo, owners: &[&dyn Entity]) -> Option<Scope> {
    rel.join_table.map(|join_table| Scope {
        table: join_table.table,
        conditions: join_table_conditions(rel, join_table, owners),
        join: None,
    })
}

fn direct_scope(rel: &RelationshipInfo, owners: &[&dyn Entity]) -> Scope {
    let (owner_columns, related_columns): (Vec<&str>, Vec<&str>) = rel
        .key_references()
        .map(|r| {
            if r.own_primary_key {
                (r.primary_key, r.foreign_key)
            } else {
                (r.foreign_key, r.primary_key)
            }
        })
        .unzip();
    let (_, values) = identity_values(owners.iter().copied(), &owner_columns);

    let mut conditions = vec![to_query_values(
        Some(rel.related_table),
        &related_columns,
        values,
    )];
    conditions.extend(literal_conditions(rel, rel.related_table));
    Scope {
        table: rel.related_table,
        conditions,
        join: None,
    }
}

fn join_table_conditions(
    rel: &RelationshipInfo,
    join_table: JoinTableInfo,
    owners: &[&dyn Entity],
) -> Vec<Expr> {
    let (owner_columns, join_columns): (Vec<&str>, Vec<&str>) = rel
        .key_references()
        .filter(|r| r.own_primary_key)
        .map(|r| (r.primary_key, r.foreign_key))
        .unzip();
    let (_, values) = identity_values(owners.iter().copied(), &owner_columns);

    let mut conditions = vec![to_query_values(
        Some(join_table.table),
        &join_columns,
        values,
    )];
    conditions.extend(literal_conditions(rel, join_table.table));
    conditions.extend(filter_conditions(join_table));
    conditions
}

/// `table.fk = literal` for every discriminator reference.
pub(crate) fn literal_conditions(rel: &RelationshipInfo, table: &str) -> Vec<Expr> {
    rel.literal_references()
        .filter_map(|r| {
            r.literal_value()
                .map(|v| Expr::qualified(table, r.foreign_key).eq(v))
        })
        .collect()
}

/// `join.column = literal` for every join-table filter.
pub(crate) fn filter_conditions(join_table: JoinTableInfo) -> Vec<Expr> {
    join_table
        .filters
        .iter()
        .map(|(column, value)| {
            Expr::qualified(join_table.table, *column).eq(Value::Text((*value).to_string()))
        })
        .collect()
}
