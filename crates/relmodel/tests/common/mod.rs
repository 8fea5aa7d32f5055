//! Shared fixtures: test models and an in-memory executor.
//!
//! `MemoryExecutor` keeps tables as lists of column maps and interprets the
//! statement and expression trees directly, so tests observe exactly what the
//! engine asked storage to do. Every call is counted, and a failure can be
//! injected to exercise error paths.

#![allow(dead_code)]

use relmodel::prelude::*;
use relmodel::{
    ALWAYS_FALSE, ALWAYS_TRUE, BinaryOp, Delete, OnConflict, Save, Select, UnaryOp, Update,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    pub user_id: Option<i64>,
    pub title: String,
}

impl Post {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            user_id: None,
            title: title.to_string(),
        }
    }

    pub fn owned_by(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("user_id", Value::from(self.user_id)),
            ("title", Value::Text(self.title.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            user_id: row.get_named("user_id")?,
            title: row.get_named("title")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "user_id" => self.user_id = value.try_into()?,
            "title" => self.title = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub user_id: Option<i64>,
    pub bio: String,
}

impl Profile {
    pub fn new(id: i64, bio: &str) -> Self {
        Self {
            id,
            user_id: None,
            bio: bio.to_string(),
        }
    }
}

impl Model for Profile {
    const TABLE_NAME: &'static str = "profiles";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("user_id", Value::from(self.user_id)),
            ("bio", Value::Text(self.bio.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            user_id: row.get_named("user_id")?,
            bio: row.get_named("bio")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "user_id" => self.user_id = value.try_into()?,
            "bio" => self.bio = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

impl Company {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Model for Company {
    const TABLE_NAME: &'static str = "companies";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Tag {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Model for Tag {
    const TABLE_NAME: &'static str = "tags";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

/// Polymorphic child: `owner_type` says which table `owner_id` points into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub owner_type: String,
    pub body: String,
}

impl Comment {
    pub fn new(id: i64, body: &str) -> Self {
        Self {
            id,
            body: body.to_string(),
            ..Self::default()
        }
    }

    pub fn on(mut self, owner_type: &str, owner_id: i64) -> Self {
        self.owner_type = owner_type.to_string();
        self.owner_id = Some(owner_id);
        self
    }
}

impl Model for Comment {
    const TABLE_NAME: &'static str = "comments";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("owner_id", Value::from(self.owner_id)),
            ("owner_type", Value::Text(self.owner_type.clone())),
            ("body", Value::Text(self.body.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            owner_id: row.get_named("owner_id")?,
            owner_type: row.get_named("owner_type")?,
            body: row.get_named("body")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "owner_id" => self.owner_id = value.try_into()?,
            "owner_type" => self.owner_type = value.try_into()?,
            "body" => self.body = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

const USER_POSTS: &[Reference] = &[Reference::owned("id", "user_id")];
const USER_PROFILE: &[Reference] = &[Reference::owned("id", "user_id")];
const USER_COMPANY: &[Reference] = &[Reference::foreign("id", "company_id")];
const USER_TAGS: &[Reference] = &[
    Reference::owned("id", "user_id"),
    Reference::foreign("id", "tag_id"),
];
const USER_TAG_FILTERS: &[(&str, &str)] = &[("kind", "interest")];
const USER_COMMENTS: &[Reference] = &[
    Reference::owned("id", "owner_id"),
    Reference::literal("owner_type", "users"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub company_id: Option<i64>,
    pub posts: Vec<Post>,
    pub profile: Option<Profile>,
    pub company: Option<Company>,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
}

impl User {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn post_ids(&self) -> Vec<i64> {
        self.posts.iter().map(|p| p.id).collect()
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|t| t.id).collect()
    }
}

impl Model for User {
    const TABLE_NAME: &'static str = "users";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[
        RelationshipInfo::new("posts", RelationshipKind::HasMany)
            .related::<Post>()
            .references(USER_POSTS),
        RelationshipInfo::new("profile", RelationshipKind::HasOne)
            .related::<Profile>()
            .references(USER_PROFILE),
        RelationshipInfo::new("company", RelationshipKind::BelongsTo)
            .related::<Company>()
            .references(USER_COMPANY),
        RelationshipInfo::new("tags", RelationshipKind::Many2Many)
            .related::<Tag>()
            .references(USER_TAGS)
            .join_table(JoinTableInfo::new("user_tags").filters(USER_TAG_FILTERS)),
        RelationshipInfo::new("comments", RelationshipKind::HasMany)
            .related::<Comment>()
            .references(USER_COMMENTS),
    ];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("name", Value::Text(self.name.clone())),
            ("company_id", Value::from(self.company_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            company_id: row.get_named("company_id")?,
            ..Self::default()
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            "company_id" => self.company_id = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }

    fn relation(&self, name: &str) -> Option<RelationValue> {
        match name {
            "posts" => Some(RelationValue::many(self.posts.clone())),
            "profile" => Some(RelationValue::optional(self.profile.clone())),
            "company" => Some(RelationValue::optional(self.company.clone())),
            "tags" => Some(RelationValue::many(self.tags.clone())),
            "comments" => Some(RelationValue::many(self.comments.clone())),
            _ => None,
        }
    }

    fn set_relation(&mut self, name: &str, value: RelationValue) -> Result<()> {
        match name {
            "posts" => self.posts = value.into_many()?,
            "profile" => self.profile = value.into_one()?,
            "company" => self.company = value.into_one()?,
            "tags" => self.tags = value.into_many()?,
            "comments" => self.comments = value.into_many()?,
            other => {
                return Err(Error::Custom(format!(
                    "model 'users' has no relationship field '{other}'"
                )));
            }
        }
        Ok(())
    }
}

/// Keyed by `(badge_org, badge_no)`; points at a team by `(team_org, team_no)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Member {
    pub badge_org: i64,
    pub badge_no: i64,
    pub team_org: Option<i64>,
    pub team_no: Option<i64>,
    pub name: String,
}

impl Member {
    pub fn new(badge_org: i64, badge_no: i64, name: &str) -> Self {
        Self {
            badge_org,
            badge_no,
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn in_team(mut self, org_id: i64, team_id: i64) -> Self {
        self.team_org = Some(org_id);
        self.team_no = Some(team_id);
        self
    }

    pub fn badge(&self) -> (i64, i64) {
        (self.badge_org, self.badge_no)
    }
}

impl Model for Member {
    const TABLE_NAME: &'static str = "members";
    const PRIMARY_KEY: &'static [&'static str] = &["badge_org", "badge_no"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("badge_org", Value::BigInt(self.badge_org)),
            ("badge_no", Value::BigInt(self.badge_no)),
            ("team_org", Value::from(self.team_org)),
            ("team_no", Value::from(self.team_no)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            badge_org: row.get_named("badge_org")?,
            badge_no: row.get_named("badge_no")?,
            team_org: row.get_named("team_org")?,
            team_no: row.get_named("team_no")?,
            name: row.get_named("name")?,
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "badge_org" => self.badge_org = value.try_into()?,
            "badge_no" => self.badge_no = value.try_into()?,
            "team_org" => self.team_org = value.try_into()?,
            "team_no" => self.team_no = value.try_into()?,
            "name" => self.name = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }
}

const TEAM_MEMBERS: &[Reference] = &[
    Reference::owned("org_id", "team_org"),
    Reference::owned("team_id", "team_no"),
];

/// Keyed by `(org_id, team_id)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Team {
    pub org_id: i64,
    pub team_id: i64,
    pub members: Vec<Member>,
}

impl Team {
    pub fn new(org_id: i64, team_id: i64) -> Self {
        Self {
            org_id,
            team_id,
            members: Vec::new(),
        }
    }

    pub fn badges(&self) -> Vec<(i64, i64)> {
        self.members.iter().map(Member::badge).collect()
    }
}

impl Model for Team {
    const TABLE_NAME: &'static str = "teams";
    const PRIMARY_KEY: &'static [&'static str] = &["org_id", "team_id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] =
        &[RelationshipInfo::new("members", RelationshipKind::HasMany)
            .related::<Member>()
            .references(TEAM_MEMBERS)];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("org_id", Value::BigInt(self.org_id)),
            ("team_id", Value::BigInt(self.team_id)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            org_id: row.get_named("org_id")?,
            team_id: row.get_named("team_id")?,
            members: Vec::new(),
        })
    }

    fn set_column(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "org_id" => self.org_id = value.try_into()?,
            "team_id" => self.team_id = value.try_into()?,
            other => return Err(Error::unknown_column(Self::TABLE_NAME, other)),
        }
        Ok(())
    }

    fn relation(&self, name: &str) -> Option<RelationValue> {
        (name == "members").then(|| RelationValue::many(self.members.clone()))
    }

    fn set_relation(&mut self, name: &str, value: RelationValue) -> Result<()> {
        if name != "members" {
            return Err(Error::Custom(format!(
                "model 'teams' has no relationship field '{name}'"
            )));
        }
        self.members = value.into_many()?;
        Ok(())
    }
}

// ============================================================================
// In-memory executor
// ============================================================================

pub type Record = BTreeMap<String, Value>;

const TABLES: &[(&str, &[&str])] = &[
    ("users", &["id"]),
    ("posts", &["id"]),
    ("profiles", &["id"]),
    ("companies", &["id"]),
    ("tags", &["id"]),
    ("comments", &["id"]),
    ("user_tags", &[]),
    ("teams", &["org_id", "team_id"]),
    ("members", &["badge_org", "badge_no"]),
];

#[derive(Debug, Default)]
struct Table {
    key_columns: Vec<String>,
    rows: Vec<Record>,
}

/// Number of executor calls, per statement kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub fetch: usize,
    pub count: usize,
    pub update: usize,
    pub delete: usize,
    pub save: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.fetch + self.count + self.update + self.delete + self.save
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    calls: Calls,
    failure: Option<String>,
    fail_from: usize,
    next_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    state: Arc<Mutex<State>>,
}

impl MemoryExecutor {
    /// An empty store with the test models' tables. Generated keys start
    /// at 101.
    pub fn new() -> Self {
        let executor = Self::default();
        {
            let mut state = executor.lock();
            state.next_id = 100;
            for (table, keys) in TABLES {
                state.tables.insert(
                    table.to_string(),
                    Table {
                        key_columns: keys.iter().map(|k| (*k).to_string()).collect(),
                        rows: Vec::new(),
                    },
                );
            }
        }
        executor
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    pub fn seed<M: Model>(&self, model: &M) {
        self.seed_row(M::TABLE_NAME, model.to_row());
    }

    pub fn seed_row(&self, table: &str, row: Vec<(&str, Value)>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(row.into_iter().map(|(c, v)| (c.to_string(), v)).collect());
    }

    /// Seed a `user_tags` join row.
    pub fn link(&self, user_id: i64, tag_id: i64) {
        self.seed_row(
            "user_tags",
            vec![
                ("user_id", Value::BigInt(user_id)),
                ("tag_id", Value::BigInt(tag_id)),
                ("kind", Value::Text("interest".to_string())),
            ],
        );
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Value of `column` in the row of `table` whose `id` is `id`.
    pub fn value(&self, table: &str, id: i64, column: &str) -> Option<Value> {
        self.rows(table)
            .into_iter()
            .find(|r| r.get("id").is_some_and(|v| v.key_eq(&Value::BigInt(id))))
            .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
    }

    /// `(team_org, team_no)` of the member keyed `(badge_org, badge_no)`,
    /// with `None` for a detached or missing member.
    pub fn member_team(&self, badge_org: i64, badge_no: i64) -> Option<(i64, i64)> {
        let key = [Value::BigInt(badge_org), Value::BigInt(badge_no)];
        let row = self.rows("members").into_iter().find(|r| {
            ["badge_org", "badge_no"]
                .iter()
                .zip(&key)
                .all(|(c, v)| r.get(*c).is_some_and(|x| x.key_eq(v)))
        })?;
        let org = row.get("team_org").and_then(Value::as_i64)?;
        let team = row.get("team_no").and_then(Value::as_i64)?;
        Some((org, team))
    }

    /// `(user_id, tag_id)` of every join row, sorted.
    pub fn links(&self) -> Vec<(i64, i64)> {
        let mut links: Vec<(i64, i64)> = self
            .rows("user_tags")
            .iter()
            .map(|r| {
                let get = |c: &str| r.get(c).and_then(Value::as_i64).unwrap_or(-1);
                (get("user_id"), get("tag_id"))
            })
            .collect();
        links.sort_unstable();
        links
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    /// Make every following call fail with `message` (or succeed again).
    pub fn fail_with(&self, message: Option<&str>) {
        let mut state = self.lock();
        state.failure = message.map(str::to_string);
        state.fail_from = 0;
    }

    /// Let calls succeed until the `call`-th one (counting from 1 over the
    /// executor's lifetime), then fail with `message`.
    pub fn fail_from(&self, call: usize, message: &str) {
        let mut state = self.lock();
        state.failure = Some(message.to_string());
        state.fail_from = call;
    }

    fn run<T>(
        &self,
        count: impl FnOnce(&mut Calls),
        op: impl FnOnce(&mut State) -> std::result::Result<T, Error>,
    ) -> Outcome<T, Error> {
        let mut state = self.lock();
        count(&mut state.calls);
        if state.calls.total() >= state.fail_from {
            if let Some(message) = state.failure.clone() {
                return Outcome::Err(Error::query(message, None));
            }
        }
        match op(&mut state) {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::Err(err),
        }
    }
}

fn scoped(table: &str, row: &Record, scope: &mut Record, unqualified: bool) {
    for (column, value) in row {
        scope.insert(format!("{table}.{column}"), value.clone());
        if unqualified {
            scope.insert(column.clone(), value.clone());
        }
    }
}

fn operand(expr: &Expr, scope: &Record) -> Vec<Value> {
    match expr {
        Expr::Column { table, name } => {
            let key = match table {
                Some(table) => format!("{table}.{name}"),
                None => name.clone(),
            };
            vec![scope.get(&key).cloned().unwrap_or(Value::Null)]
        }
        Expr::Literal(value) => vec![value.clone()],
        Expr::Tuple(items) => items.iter().flat_map(|i| operand(i, scope)).collect(),
        Expr::Paren(inner) => operand(inner, scope),
        other => panic!("unsupported operand: {other:?}"),
    }
}

fn same(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| a.key_eq(b))
}

fn eval(expr: &Expr, scope: &Record) -> bool {
    match expr {
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => eval(left, scope) && eval(right, scope),
            BinaryOp::Or => eval(left, scope) || eval(right, scope),
            BinaryOp::Eq => same(&operand(left, scope), &operand(right, scope)),
        },
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => !eval(expr, scope),
        Expr::In {
            expr,
            values,
            negated,
        } => {
            let target = operand(expr, scope);
            let found = values.iter().any(|v| same(&target, &operand(v, scope)));
            found != *negated
        }
        Expr::IsNull { expr, negated } => {
            operand(expr, scope).iter().all(Value::is_null) != *negated
        }
        Expr::Raw(sql) if sql == ALWAYS_FALSE => false,
        Expr::Raw(sql) if sql == ALWAYS_TRUE => true,
        Expr::Paren(inner) => eval(inner, scope),
        other => panic!("unsupported predicate: {other:?}"),
    }
}

fn table<'s>(state: &'s State, name: &str) -> std::result::Result<&'s Table, Error> {
    state
        .tables
        .get(name)
        .ok_or_else(|| Error::query(format!("no such table: {name}"), None))
}

fn select_rows(state: &State, select: &Select) -> std::result::Result<Vec<Record>, Error> {
    let base = table(state, &select.table)?;
    let mut matched = Vec::new();
    for row in &base.rows {
        let mut scope = Record::new();
        scoped(&select.table, row, &mut scope, true);
        match &select.join {
            None => {
                if select.conditions.iter().all(|c| eval(c, &scope)) {
                    matched.push(row.clone());
                }
            }
            Some(join) => {
                for other in &table(state, &join.table)?.rows {
                    let mut combined = scope.clone();
                    scoped(&join.table, other, &mut combined, false);
                    if eval(&join.on, &combined)
                        && select.conditions.iter().all(|c| eval(c, &combined))
                    {
                        matched.push(row.clone());
                    }
                }
            }
        }
    }
    Ok(matched)
}

fn matches_all(table_name: &str, conditions: &[Expr], row: &Record) -> bool {
    let mut scope = Record::new();
    scoped(table_name, row, &mut scope, true);
    conditions.iter().all(|c| eval(c, &scope))
}

fn apply_save(state: &mut State, save: &Save) -> std::result::Result<Option<i64>, Error> {
    let mut record: Record = save.row.iter().cloned().collect();
    if save.generates_key() {
        state.next_id += 1;
        let id = state.next_id;
        for key in &save.key_columns {
            record.entry(key.clone()).or_insert(Value::BigInt(id));
        }
        state
            .tables
            .entry(save.table.clone())
            .or_default()
            .rows
            .push(record);
        return Ok(Some(id));
    }

    let table = state.tables.entry(save.table.clone()).or_default();
    let key_columns = table.key_columns.clone();
    let existing = table.rows.iter().position(|row| {
        if key_columns.is_empty() {
            record
                .iter()
                .all(|(c, v)| row.get(c).is_some_and(|x| x.key_eq(v)))
        } else {
            key_columns.iter().all(|k| {
                match (row.get(k), record.get(k)) {
                    (Some(a), Some(b)) => a.key_eq(b),
                    _ => false,
                }
            })
        }
    });
    match (existing, &save.on_conflict) {
        (None, _) => table.rows.push(record),
        (Some(_), OnConflict::Fail) => {
            return Err(Error::query(
                format!("UNIQUE constraint failed: {}", save.table),
                None,
            ));
        }
        (Some(_), OnConflict::DoNothing) => {}
        (Some(index), OnConflict::DoUpdate(columns)) => {
            let row = &mut table.rows[index];
            for column in columns {
                if let Some(value) = record.get(column) {
                    row.insert(column.clone(), value.clone());
                }
            }
        }
    }
    Ok(None)
}

fn apply_update(state: &mut State, update: &Update) -> std::result::Result<u64, Error> {
    let table = state
        .tables
        .get_mut(&update.table)
        .ok_or_else(|| Error::query(format!("no such table: {}", update.table), None))?;
    let mut affected = 0;
    for row in &mut table.rows {
        if matches_all(&update.table, &update.conditions, row) {
            for (column, value) in &update.set {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
    }
    Ok(affected)
}

fn apply_delete(state: &mut State, delete: &Delete) -> std::result::Result<u64, Error> {
    let table = state
        .tables
        .get_mut(&delete.table)
        .ok_or_else(|| Error::query(format!("no such table: {}", delete.table), None))?;
    let before = table.rows.len();
    table
        .rows
        .retain(|row| !matches_all(&delete.table, &delete.conditions, row));
    Ok((before - table.rows.len()) as u64)
}

impl Executor for MemoryExecutor {
    fn fetch(
        &self,
        _cx: &Cx,
        select: &Select,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.run(
            |calls| calls.fetch += 1,
            |state| {
                select_rows(state, select)
                    .map(|rows| rows.into_iter().map(Row::from_pairs).collect())
            },
        );
        async move { outcome }
    }

    fn count(&self, _cx: &Cx, select: &Select) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.run(
            |calls| calls.count += 1,
            |state| select_rows(state, select).map(|rows| rows.len() as u64),
        );
        async move { outcome }
    }

    fn update_columns(
        &self,
        _cx: &Cx,
        update: &Update,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.run(|calls| calls.update += 1, |state| apply_update(state, update));
        async move { outcome }
    }

    fn delete(&self, _cx: &Cx, delete: &Delete) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.run(|calls| calls.delete += 1, |state| apply_delete(state, delete));
        async move { outcome }
    }

    fn save(&self, _cx: &Cx, save: &Save) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        let outcome = self.run(|calls| calls.save += 1, |state| apply_save(state, save));
        async move { outcome }
    }
}

// ============================================================================
// Outcome helpers
// ============================================================================

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, AssociationError>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn expect_error<T: std::fmt::Debug>(outcome: Outcome<T, AssociationError>) -> AssociationError {
    match outcome {
        Outcome::Err(err) => err,
        other => std::panic::panic_any(format!("expected an error, got: {other:?}")),
    }
}
