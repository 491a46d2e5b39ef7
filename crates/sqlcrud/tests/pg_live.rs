//! End-to-end checks against a real Postgres. Skipped unless `DATABASE_URL` is set.

#![cfg(feature = "pool")]

use sqlcrud::{
    CrudRepository, Executor, FromRow, GetOptions, Model, OrmResult, PgDatabase,
    RepositoryConfig, Row, SearchOptions, create_pool, sql,
};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: i64,
    body: String,
    archived: bool,
}

impl FromRow for Note {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            body: row.try_get("body")?,
            archived: row.try_get("archived")?,
        })
    }
}

impl Model for Note {
    fn to_row(&self) -> Row {
        Row::new()
            .set("id", self.id)
            .set("body", self.body.as_str())
            .set("archived", self.archived)
    }
}

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").ok()
}

fn unique_table() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("sqlcrud_notes_{}_{}", std::process::id(), nanos)
}

#[tokio::test]
async fn crud_roundtrip_with_scope() -> OrmResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping crud_roundtrip_with_scope");
        return Ok(());
    };

    let db = PgDatabase::new(create_pool(&url)?);
    let table = unique_table();
    let table_ident = sqlcrud::Ident::parse(&table)?;
    db.execute(&sql!(
        "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL, archived BOOLEAN NOT NULL DEFAULT FALSE)",
        &table_ident
    ))
    .await?;

    let config = RepositoryConfig::new(table_ident.clone())?.with_scope(sql!("NOT archived"));
    let notes: CrudRepository<Note, _> = CrudRepository::new(db.clone(), config);

    let first = notes.create(Row::new().set("body", "first")).await?;
    assert_eq!(first.body, "first");
    assert!(!first.archived);

    let fetched = notes.get(first.id, GetOptions::new()).await?;
    assert_eq!(fetched, first);

    let renamed = notes
        .update(&first, Row::new().set("body", "renamed"))
        .await?;
    assert_eq!(renamed.body, "renamed");

    notes.create(Row::new().set("body", "second")).await?;
    let found = notes
        .search(SearchOptions::new().order_by(sql!("id")))
        .await?;
    assert_eq!(found.len(), 2);

    // Archived rows fall outside the scope.
    db.execute(&sql!(
        "UPDATE {} SET archived = TRUE WHERE id = {}",
        &table_ident,
        first.id
    ))
    .await?;
    assert!(notes.get(first.id, GetOptions::new()).await.unwrap_err().is_not_found());
    assert_eq!(notes.delete(&renamed).await?, 0);

    db.execute(&sql!("DROP TABLE {}", &table_ident)).await?;
    Ok(())
}

#[tokio::test]
async fn failed_update_rolls_back() -> OrmResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping failed_update_rolls_back");
        return Ok(());
    };

    let db = PgDatabase::new(create_pool(&url)?);
    let table = unique_table();
    let table_ident = sqlcrud::Ident::parse(&table)?;
    db.execute(&sql!(
        "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL UNIQUE, archived BOOLEAN NOT NULL DEFAULT FALSE)",
        &table_ident
    ))
    .await?;

    let notes: CrudRepository<Note, _> =
        CrudRepository::new(db.clone(), RepositoryConfig::new(table_ident.clone())?);
    let a = notes.create(Row::new().set("body", "a")).await?;
    notes.create(Row::new().set("body", "b")).await?;

    // Unique violation.
    assert!(notes.update(&a, Row::new().set("body", "b")).await.is_err());
    assert_eq!(notes.get(a.id, GetOptions::new()).await?.body, "a");

    db.execute(&sql!("DROP TABLE {}", &table_ident)).await?;
    Ok(())
}
