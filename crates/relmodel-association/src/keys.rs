//! Identity keys of entities.
//!
//! An identity is the tuple of values an entity holds in a given list of
//! columns. Identities are compared through a canonical string, the JSON
//! encoding of the tuple, so values of different types never collide
//! (`BigInt(1)` and `Text("1")` are different keys) while the two integer
//! widths are unified.

use relmodel_core::{Entity, Value};
use relmodel_query::Expr;
use std::collections::HashMap;

/// Canonical identity key of a value tuple.
pub fn identity_key(values: &[Value]) -> String {
    let normalized: Vec<Value> = values
        .iter()
        .map(|v| match v {
            Value::Int(i) => Value::BigInt(i64::from(*i)),
            other => other.clone(),
        })
        .collect();
    serde_json::to_string(&normalized).unwrap_or_else(|_| format!("{normalized:?}"))
}

/// Identity key to originating indices.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: HashMap<String, Vec<usize>>,
}

impl IdentityMap {
    pub fn contains(&self, values: &[Value]) -> bool {
        self.entries.contains_key(&identity_key(values))
    }

    /// Indices of every entity that produced this identity.
    pub fn indices(&self, values: &[Value]) -> Option<&[usize]> {
        self.entries.get(&identity_key(values)).map(Vec::as_slice)
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read `columns` from one entity. Missing columns read as NULL.
pub fn entity_key(entity: &dyn Entity, columns: &[&str]) -> Vec<Value> {
    columns
        .iter()
        .map(|col| entity.read_column(col).unwrap_or(Value::Null))
        .collect()
}

/// Collect the identities of `entities` over `columns`.
///
/// Returns the identity map and the distinct value tuples in first-seen
/// order. Zero and NULL values are kept.
pub fn identity_values<'e, I>(entities: I, columns: &[&str]) -> (IdentityMap, Vec<Vec<Value>>)
where
    I: IntoIterator<Item = &'e dyn Entity>,
{
    let mut map = IdentityMap::default();
    let mut values = Vec::new();
    for (index, entity) in entities.into_iter().enumerate() {
        let key_values = entity_key(entity, columns);
        let key = identity_key(&key_values);
        let slot = map.entries.entry(key).or_default();
        if slot.is_empty() {
            values.push(key_values);
        }
        slot.push(index);
    }
    (map, values)
}

fn column_expr(table: Option<&str>, column: &str) -> Expr {
    match table {
        Some(table) => Expr::qualified(table, column),
        None => Expr::col(column),
    }
}

fn tuple_of(values: Vec<Value>) -> Expr {
    Expr::tuple(values.into_iter().map(Expr::Literal).collect())
}

/// Membership of `columns` in `values`.
///
/// One value tuple renders as an equality, several as `IN`, none as the
/// always-false predicate. Composite keys compare as row values.
pub fn to_query_values(table: Option<&str>, columns: &[&str], values: Vec<Vec<Value>>) -> Expr {
    let target = Expr::tuple(columns.iter().map(|c| column_expr(table, c)).collect());
    if values.len() == 1 {
        let only = values.into_iter().next().unwrap_or_default();
        return target.eq(tuple_of(only));
    }
    target.in_list(values.into_iter().map(tuple_of).collect::<Vec<_>>())
}

/// Negated membership; no values renders as the always-true predicate.
pub fn to_excluded_values(table: Option<&str>, columns: &[&str], values: Vec<Vec<Value>>) -> Expr {
    let target = Expr::tuple(columns.iter().map(|c| column_expr(table, c)).collect());
    target.not_in_list(values.into_iter().map(tuple_of).collect::<Vec<_>>())
}
