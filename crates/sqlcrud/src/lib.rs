//! # sqlcrud
//!
//! Composable SQL fragments and a scoped CRUD repository over pluggable executors.
//!
//! ## Features
//!
//! - **Fragments, not strings**: [`sql!`] builds immutable [`Fragment`] trees; values are
//!   always bound as parameters and placeholders are numbered only at compile time
//! - **Dialect-aware**: one fragment compiles to `$n` ([`Postgres`]), `?` ([`Sqlite`],
//!   [`MySql`]) or any custom placeholder scheme ([`compile_with`])
//! - **Scoped repositories**: a [`CrudRepository`] AND-s its scope (soft-delete, tenant, ...)
//!   into every statement it issues
//! - **Transaction-friendly**: `create`/`update` run inside a transaction; the `*_in`
//!   variants accept any [`Executor`], including a transaction the caller opened
//! - **Pluggable drivers**: implement [`Executor`]/[`Database`] for any client; a
//!   tokio-postgres implementation ships behind the `postgres` feature
//!
//! ## Fragments
//!
//! ```ignore
//! use sqlcrud::{ident, sql, Fragment};
//!
//! let active = sql!("status = {}", "active");
//! let q = sql!("SELECT * FROM {} WHERE {} AND age > {}", ident("users"), active, 18);
//!
//! let compiled = q.compile(&sqlcrud::Postgres);
//! assert_eq!(compiled.sql, r#"SELECT * FROM "users" WHERE status = $1 AND age > $2"#);
//! ```
//!
//! ## Repository
//!
//! ```ignore
//! use sqlcrud::{CrudRepository, PgDatabase, RepositoryConfig, Row, create_pool};
//!
//! let db = PgDatabase::new(create_pool(&database_url)?);
//! let users: CrudRepository<User, _> = CrudRepository::new(
//!     db,
//!     RepositoryConfig::new("users")?.with_scope(sql!("deleted_at IS NULL")),
//! );
//!
//! let user = users.create(Row::new().set("name", "alice")).await?;
//! let user = users.update(&user, Row::new().set("name", "bob")).await?;
//! users.delete(&user).await?;
//! ```

pub mod compile;
pub mod database;
pub mod error;
pub mod fragment;
pub mod ident;
pub mod repository;
pub mod row;
pub mod value;

#[cfg(feature = "postgres")]
pub mod pg;

#[cfg(feature = "pool")]
pub mod pool;

pub use compile::{CompiledQuery, Dialect, MySql, Postgres, Sqlite, compile, compile_with};
pub use database::{Database, Executor, Inserted, Transaction, finish};
pub use error::{OrmError, OrmResult};
pub use fragment::{Fragment, IntoPart, Part, ident, join};
pub use ident::{Ident, IdentPart, IntoIdent};
pub use repository::{CrudRepository, GetOptions, RepositoryConfig, SearchOptions};
pub use row::{Attributes, FromRow, Model, Row};
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub use pool::{
    PgDatabase, PgTransaction, create_pool, create_pool_with_config,
    create_pool_with_manager_config,
};

/// Common imports.
pub mod prelude {
    pub use crate::sql;
    pub use crate::{
        Attributes, CrudRepository, Database, Executor, Fragment, FromRow, GetOptions, Model,
        OrmError, OrmResult, RepositoryConfig, Row, SearchOptions, Transaction, Value, ident,
        join,
    };
}
