//! Generic CRUD repository over a single table.
//!
//! A [`CrudRepository`] binds a database handle, a table, its primary-key column, a model
//! type and an optional *scope*: a filter fragment AND-ed into every statement the
//! repository issues (soft-delete or tenant filters, typically).
//!
//! # Example
//!
//! ```ignore
//! use sqlcrud::{sql, CrudRepository, RepositoryConfig, Row, SearchOptions};
//!
//! let config = RepositoryConfig::new("users")?.with_scope(sql!("deleted_at IS NULL"));
//! let users: CrudRepository<User, _> = CrudRepository::new(db, config);
//!
//! let alice = users.create(Row::new().set("name", "alice")).await?;
//! let alice = users.update(&alice, Row::new().set("email", "a@example.com")).await?;
//! let active = users
//!     .search(SearchOptions::new().filter(sql!("status = {}", "active")))
//!     .await?;
//! users.delete(&alice).await?;
//! ```
//!
//! `create` and `update` re-read the row after writing when the driver does not return
//! it. Another connection may delete the row in between; that surfaces as
//! [`OrmError::NotFound`] and is not guarded against.

use crate::database::{Database, Executor, Inserted, finish};
use crate::error::{OrmError, OrmResult};
use crate::fragment::{Fragment, ident, join};
use crate::ident::{Ident, IntoIdent};
use crate::row::{Attributes, Model, Row};
use crate::sql;
use crate::value::Value;
use serde::Deserialize;
use std::marker::PhantomData;

/// Table binding shared by every operation of a repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRepositoryConfig")]
pub struct RepositoryConfig {
    /// Table (optionally schema-qualified).
    pub table: Ident,
    /// Primary-key column. Defaults to `id`.
    pub primary_key: Ident,
    /// Filter applied to every statement.
    pub scope: Option<Fragment>,
}

/// Serialized form: identifiers are parsed, `scope` is trusted raw SQL.
#[derive(Deserialize)]
struct RawRepositoryConfig {
    table: String,
    #[serde(default = "default_primary_key")]
    primary_key: String,
    #[serde(default)]
    scope: Option<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TryFrom<RawRepositoryConfig> for RepositoryConfig {
    type Error = OrmError;

    fn try_from(raw: RawRepositoryConfig) -> OrmResult<Self> {
        Ok(Self {
            table: Ident::parse(&raw.table)?,
            primary_key: Ident::parse(&raw.primary_key)?,
            scope: None,
        }
        .with_scope(
            raw.scope
                .filter(|scope| !scope.trim().is_empty())
                .map(Fragment::raw)
                .unwrap_or_default(),
        ))
    }
}

impl RepositoryConfig {
    /// Bind `table` with primary key `id` and no scope.
    pub fn new(table: impl IntoIdent) -> OrmResult<Self> {
        Ok(Self {
            table: table.into_ident()?,
            primary_key: Ident::parse(&default_primary_key())?,
            scope: None,
        })
    }

    /// Set the primary-key column.
    pub fn with_primary_key(mut self, primary_key: impl IntoIdent) -> OrmResult<Self> {
        self.primary_key = primary_key.into_ident()?;
        Ok(self)
    }

    /// Set the scope filter. An empty fragment clears it.
    pub fn with_scope(mut self, scope: Fragment) -> Self {
        self.scope = (!scope.is_empty()).then_some(scope);
        self
    }
}

/// Options for [`CrudRepository::get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Select list; `*` when absent.
    pub select: Option<Fragment>,
    /// Trailing SQL such as `FOR UPDATE`.
    pub postfix: Option<Fragment>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: Fragment) -> Self {
        self.select = Some(select);
        self
    }

    pub fn postfix(mut self, postfix: Fragment) -> Self {
        self.postfix = Some(postfix);
        self
    }
}

/// Options for [`CrudRepository::search`]. Every clause is optional; absent clauses are
/// left out of the statement entirely.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub select: Option<Fragment>,
    /// Replaces the repository table in the `FROM` clause (joins, subqueries).
    pub from: Option<Fragment>,
    /// `WHERE` condition, AND-ed with the repository scope.
    pub filter: Option<Fragment>,
    pub group_by: Option<Fragment>,
    pub order_by: Option<Fragment>,
    /// Trailing SQL such as `LIMIT 10`.
    pub postfix: Option<Fragment>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: Fragment) -> Self {
        self.select = Some(select);
        self
    }

    pub fn from(mut self, from: Fragment) -> Self {
        self.from = Some(from);
        self
    }

    pub fn filter(mut self, filter: Fragment) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn group_by(mut self, group_by: Fragment) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn order_by(mut self, order_by: Fragment) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn postfix(mut self, postfix: Fragment) -> Self {
        self.postfix = Some(postfix);
        self
    }
}

/// CRUD operations for model `M` stored in one table, executed through `D`.
pub struct CrudRepository<M, D> {
    db: D,
    config: RepositoryConfig,
    _model: PhantomData<fn() -> M>,
}

impl<M, D: Clone> Clone for CrudRepository<M, D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            config: self.config.clone(),
            _model: PhantomData,
        }
    }
}

fn non_empty(fragment: Option<Fragment>) -> Option<Fragment> {
    fragment.filter(|f| !f.is_empty())
}

fn exactly_one(rows: Vec<Row>, describe: impl FnOnce() -> String) -> OrmResult<Row> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (Some(row), None) => Ok(row),
        (None, _) => Err(OrmError::not_found(describe())),
        (Some(_), Some(_)) => Err(OrmError::too_many_results(1, 2 + rows.count())),
    }
}

impl<M, D> CrudRepository<M, D> {
    pub fn new(db: D, config: RepositoryConfig) -> Self {
        Self {
            db,
            config,
            _model: PhantomData,
        }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Configured scope, unless it renders to nothing.
    fn scope(&self) -> Option<Fragment> {
        non_empty(self.config.scope.clone())
    }

    /// `<pk> = <key>`, AND-ed with the scope when one is configured.
    fn key_filter(&self, key: Value) -> Fragment {
        let pk = &self.config.primary_key;
        match self.scope() {
            Some(scope) => sql!("{} = {} AND ({})", pk, key, scope),
            None => sql!("{} = {}", pk, key),
        }
    }

    fn describe_key(&self, key: &Value) -> String {
        format!(
            "{} with {} = {:?}",
            self.config.table,
            self.config.primary_key.name(),
            key
        )
    }

    /// `SELECT ... WHERE <pk> = <key>` statement used by `get`.
    pub fn get_statement(&self, key: impl Into<Value>, options: GetOptions) -> Fragment {
        let select = non_empty(options.select).unwrap_or_else(|| Fragment::raw("*"));
        let mut clauses = vec![
            sql!("SELECT {}", select),
            sql!("FROM {}", &self.config.table),
            sql!("WHERE {}", self.key_filter(key.into())),
        ];
        clauses.extend(non_empty(options.postfix));
        join(clauses, Fragment::raw(" "))
    }

    /// `SELECT` statement used by `search`.
    pub fn search_statement(&self, options: SearchOptions) -> Fragment {
        let select = non_empty(options.select).unwrap_or_else(|| Fragment::raw("*"));
        let from = non_empty(options.from).unwrap_or_else(|| self.config.table.clone().into());
        let condition = match (non_empty(options.filter), self.scope()) {
            (Some(filter), Some(scope)) => Some(filter.and(scope)),
            (filter, scope) => filter.or(scope),
        };

        let mut clauses = vec![sql!("SELECT {}", select), sql!("FROM {}", from)];
        clauses.extend(condition.map(|c| sql!("WHERE {}", c)));
        clauses.extend(non_empty(options.group_by).map(|g| sql!("GROUP BY {}", g)));
        clauses.extend(non_empty(options.order_by).map(|o| sql!("ORDER BY {}", o)));
        clauses.extend(non_empty(options.postfix));
        join(clauses, Fragment::raw(" "))
    }

    /// `INSERT` statement used by `create`.
    pub fn insert_statement(&self, attributes: &Attributes) -> Fragment {
        if attributes.is_empty() {
            return sql!("INSERT INTO {} DEFAULT VALUES", &self.config.table);
        }
        let (columns, values): (Vec<Fragment>, Vec<Fragment>) = attributes
            .iter()
            .map(|(column, value)| (ident(column), Fragment::value(value.clone())))
            .unzip();
        sql!(
            "INSERT INTO {} ({}) VALUES ({})",
            &self.config.table,
            join(columns, Fragment::raw(", ")),
            join(values, Fragment::raw(", ")),
        )
    }

    /// `UPDATE` statement used by `update`.
    pub fn update_statement(&self, key: impl Into<Value>, attributes: &Attributes) -> Fragment {
        let assignments = attributes
            .iter()
            .map(|(column, value)| sql!("{} = {}", ident(column), value.clone()));
        sql!(
            "UPDATE {} SET {} WHERE {}",
            &self.config.table,
            join(assignments, Fragment::raw(", ")),
            self.key_filter(key.into()),
        )
    }

    /// `DELETE` statement used by `delete`.
    pub fn delete_statement(&self, key: impl Into<Value>) -> Fragment {
        sql!(
            "DELETE FROM {} WHERE {}",
            &self.config.table,
            self.key_filter(key.into())
        )
    }
}

impl<M: Model, D> CrudRepository<M, D> {
    /// Build a model from a row.
    pub fn hydrate(&self, row: &Row) -> OrmResult<M> {
        M::from_row(row)
    }

    /// Primary-key value of `model`.
    pub fn key_of(&self, model: &M) -> OrmResult<Value> {
        let column = self.config.primary_key.name();
        match model.to_row().get(column) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(OrmError::validation(format!(
                "model has no value for primary key '{column}'"
            ))),
        }
    }

    async fn fetch_by_key<E: Executor>(
        &self,
        exec: &E,
        key: Value,
        options: GetOptions,
    ) -> OrmResult<Row> {
        let statement = self.get_statement(key.clone(), options);
        let rows = exec.query(&statement).await?;
        exactly_one(rows, || self.describe_key(&key)).inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "sqlcrud.repository",
                table = %self.config.table,
                key = ?key,
                error = %_err,
                "lookup by primary key did not return exactly one row"
            );
        })
    }

    /// Fetch the row with primary key `key` through `exec`.
    pub async fn get_in<E: Executor>(
        &self,
        exec: &E,
        key: impl Into<Value>,
        options: GetOptions,
    ) -> OrmResult<M> {
        let row = self.fetch_by_key(exec, key.into(), options).await?;
        self.hydrate(&row)
    }

    /// Search through `exec`. An empty result is not an error.
    pub async fn search_in<E: Executor>(&self, exec: &E, options: SearchOptions) -> OrmResult<Vec<M>> {
        let statement = self.search_statement(options);
        let rows = exec.query(&statement).await?;
        rows.iter().map(|row| self.hydrate(row)).collect()
    }

    /// Insert `attributes` through `exec` and return the stored model.
    ///
    /// - A returned row is hydrated directly.
    /// - A returned key is re-read with [`get_in`](Self::get_in); a row that vanished in
    ///   between yields [`OrmError::NotFound`].
    /// - Nothing usable falls back to the submitted attributes, so database defaults are
    ///   not reflected.
    pub async fn create_in<E: Executor>(&self, exec: &E, attributes: Attributes) -> OrmResult<M> {
        let statement = self.insert_statement(&attributes);
        let inserted = exec.insert_and_get(&statement).await?;
        match inserted.into_iter().next() {
            Some(Inserted::Row(row)) => self.hydrate(&row),
            Some(Inserted::Key(key)) if !key.is_null() => {
                self.get_in(exec, key, GetOptions::default()).await
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    target: "sqlcrud.repository",
                    table = %self.config.table,
                    "insert returned no key or row; using submitted attributes"
                );
                self.hydrate(&attributes)
            }
        }
    }

    /// Apply `attributes` to the row of `model` through `exec`.
    ///
    /// Returns `model` with the fresh column values merged in.
    pub async fn update_in<E: Executor>(
        &self,
        exec: &E,
        model: &M,
        attributes: Attributes,
    ) -> OrmResult<M> {
        if attributes.is_empty() {
            return Err(OrmError::validation(format!(
                "update of {} requires at least one attribute",
                self.config.table
            )));
        }
        let key = self.key_of(model)?;
        let statement = self.update_statement(key.clone(), &attributes);
        let fresh = match exec.update_and_get(&statement).await? {
            Some(rows) => exactly_one(rows, || self.describe_key(&key))?,
            None => self.fetch_by_key(exec, key, GetOptions::default()).await?,
        };
        let mut merged = model.to_row();
        merged.merge(fresh);
        self.hydrate(&merged)
    }

    /// Delete the row with primary key `key` through `exec`.
    ///
    /// Deleting a missing row is not an error; the affected count is returned.
    pub async fn delete_in<E: Executor>(&self, exec: &E, key: impl Into<Value>) -> OrmResult<u64> {
        let statement = self.delete_statement(key);
        let affected = exec.execute(&statement).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sqlcrud.repository",
            table = %self.config.table,
            affected,
            "delete by primary key"
        );
        Ok(affected)
    }
}

impl<M: Model, D: Executor> CrudRepository<M, D> {
    /// Fetch the model with primary key `key`.
    ///
    /// Fails with [`OrmError::NotFound`] on zero rows and [`OrmError::TooManyResults`] on
    /// more than one.
    pub async fn get(&self, key: impl Into<Value>, options: GetOptions) -> OrmResult<M> {
        self.get_in(&self.db, key, options).await
    }

    /// Fetch every model matching `options` (and the scope).
    pub async fn search(&self, options: SearchOptions) -> OrmResult<Vec<M>> {
        self.search_in(&self.db, options).await
    }

    /// Delete `model`'s row. Idempotent.
    pub async fn delete(&self, model: &M) -> OrmResult<u64> {
        let key = self.key_of(model)?;
        self.delete_in(&self.db, key).await
    }

    /// Delete the row with primary key `key`. Idempotent.
    pub async fn delete_by_key(&self, key: impl Into<Value>) -> OrmResult<u64> {
        self.delete_in(&self.db, key).await
    }
}

impl<M: Model, D: Database> CrudRepository<M, D> {
    /// [`create_in`](Self::create_in) inside a transaction opened on the database,
    /// committed on success and rolled back on error.
    pub async fn create(&self, attributes: Attributes) -> OrmResult<M> {
        let tx = self.db.begin().await?;
        let result = self.create_in(&tx, attributes).await;
        finish(tx, result).await
    }

    /// [`update_in`](Self::update_in) inside a transaction opened on the database,
    /// committed on success and rolled back on error.
    pub async fn update(&self, model: &M, attributes: Attributes) -> OrmResult<M> {
        let tx = self.db.begin().await?;
        let result = self.update_in(&tx, model, attributes).await;
        finish(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(config: RepositoryConfig) -> CrudRepository<Row, ()> {
        CrudRepository::new((), config)
    }

    fn users() -> RepositoryConfig {
        RepositoryConfig::new("users").unwrap()
    }

    #[test]
    fn get_statement_without_scope() {
        let q = repo(users()).get_statement(7, GetOptions::new());
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE id = $1");
    }

    #[test]
    fn get_statement_with_scope_select_and_postfix() {
        let config = users().with_scope(sql!("tenant_id = {}", 3));
        let options = GetOptions::new()
            .select(sql!("id, name"))
            .postfix(sql!("FOR UPDATE"));
        let q = repo(config).get_statement(7, options).compile(&crate::Postgres);
        assert_eq!(
            q.sql,
            "SELECT id, name FROM users WHERE id = $1 AND (tenant_id = $2) FOR UPDATE"
        );
        assert_eq!(q.params, vec![Value::Int(7), Value::Int(3)]);
    }

    #[test]
    fn search_statement_omits_absent_clauses() {
        let q = repo(users()).search_statement(SearchOptions::new());
        assert_eq!(q.to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn search_statement_applies_scope_without_filter() {
        let config = users().with_scope(sql!("deleted_at IS NULL"));
        let q = repo(config).search_statement(SearchOptions::new());
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE deleted_at IS NULL");
    }

    #[test]
    fn search_statement_all_clauses() {
        let config = users().with_scope(sql!("deleted_at IS NULL"));
        let options = SearchOptions::new()
            .select(sql!("status, count(*)"))
            .from(sql!("users u"))
            .filter(sql!("age > {}", 18))
            .group_by(sql!("status"))
            .order_by(sql!("status DESC"))
            .postfix(sql!("LIMIT {}", 10));
        let q = repo(config).search_statement(options);
        assert_eq!(
            q.to_sql(),
            "SELECT status, count(*) FROM users u WHERE (age > $1) AND (deleted_at IS NULL) \
             GROUP BY status ORDER BY status DESC LIMIT $2"
        );
    }

    #[test]
    fn empty_clauses_are_treated_as_absent() {
        let options = SearchOptions::new()
            .filter(Fragment::empty())
            .order_by(Fragment::raw(""));
        let q = repo(users()).search_statement(options);
        assert_eq!(q.to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn insert_statement_quotes_columns() {
        let attrs = Row::new().set("name", "alice").set("age", 30);
        let q = repo(users()).insert_statement(&attrs);
        assert_eq!(
            q.to_sql(),
            r#"INSERT INTO users ("name", "age") VALUES ($1, $2)"#
        );
    }

    #[test]
    fn insert_statement_without_attributes_uses_defaults() {
        let q = repo(users()).insert_statement(&Row::new());
        assert_eq!(q.to_sql(), "INSERT INTO users DEFAULT VALUES");
    }

    #[test]
    fn update_statement_assigns_then_filters() {
        let config = users()
            .with_primary_key("user_id")
            .unwrap()
            .with_scope(sql!("org = {}", "acme"));
        let attrs = Row::new().set("name", "bob").set("active", false);
        let q = repo(config).update_statement(9, &attrs).compile(&crate::Postgres);
        assert_eq!(
            q.sql,
            r#"UPDATE users SET "name" = $1, "active" = $2 WHERE user_id = $3 AND (org = $4)"#
        );
        assert_eq!(
            q.params,
            vec![
                Value::Text("bob".into()),
                Value::Bool(false),
                Value::Int(9),
                Value::Text("acme".into()),
            ]
        );
    }

    #[test]
    fn delete_statement_filters_on_key() {
        let q = repo(users()).delete_statement("abc");
        assert_eq!(q.to_sql(), "DELETE FROM users WHERE id = $1");
    }

    #[test]
    fn key_of_requires_non_null_primary_key() {
        let r = repo(users());
        assert_eq!(r.key_of(&Row::new().set("id", 4)).unwrap(), Value::Int(4));
        assert!(r.key_of(&Row::new().set("name", "x")).is_err());
        assert!(r.key_of(&Row::new().set("id", None::<i64>)).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RepositoryConfig =
            serde_json::from_str(r#"{ "table": "public.users" }"#).unwrap();
        assert_eq!(config.table, Ident::parse("public.users").unwrap());
        assert_eq!(config.primary_key.name(), "id");
        assert!(config.scope.is_none());
    }

    #[test]
    fn config_rejects_bad_identifiers() {
        let parsed = serde_json::from_str::<RepositoryConfig>(r#"{ "table": "users; --" }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn empty_scope_is_cleared() {
        let config = users().with_scope(Fragment::empty());
        assert!(config.scope.is_none());
    }

    #[test]
    fn blank_scope_from_config_is_ignored() {
        let config: RepositoryConfig =
            serde_json::from_str(r#"{ "table": "users", "scope": "  " }"#).unwrap();
        assert!(config.scope.is_none());

        let r = repo(config);
        assert_eq!(r.search_statement(SearchOptions::new()).to_sql(), "SELECT * FROM users");
        assert_eq!(
            r.get_statement(1, GetOptions::new()).to_sql(),
            "SELECT * FROM users WHERE id = $1"
        );
    }

    #[test]
    fn hand_set_empty_scope_is_ignored() {
        let mut config = users();
        config.scope = Some(Fragment::raw(""));
        let r = repo(config);
        assert_eq!(r.delete_statement(1).to_sql(), "DELETE FROM users WHERE id = $1");
        assert_eq!(r.search_statement(SearchOptions::new()).to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn exactly_one_counts_all_rows() {
        let rows = vec![Row::new(), Row::new(), Row::new()];
        let err = exactly_one(rows, || "x".into()).unwrap_err();
        assert!(matches!(err, OrmError::TooManyResults { expected: 1, got: 3 }));
        assert!(exactly_one(vec![], || "x".into()).unwrap_err().is_not_found());
    }
}
