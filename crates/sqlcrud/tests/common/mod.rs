//! Scripted in-memory database for repository tests.
//!
//! Every statement is compiled with the stub's dialect (Postgres unless set) and logged;
//! replies are consumed in order from a queue set up by the test.

#![allow(dead_code)]

use sqlcrud::{
    Database, Dialect, Executor, Fragment, FromRow, Inserted, Model, OrmError, OrmResult,
    Postgres, Row, Transaction, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the next executor call returns.
#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Inserted(Vec<Inserted>),
    Updated(Option<Vec<Row>>),
    Affected(u64),
    Fail(&'static str),
}

/// Something that happened on the stub.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sql { sql: String, params: Vec<Value> },
    Begin,
    Commit,
    Rollback,
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    events: Vec<Event>,
}

#[derive(Clone)]
pub struct StubDatabase {
    state: Arc<Mutex<State>>,
    dialect: Arc<dyn Dialect>,
}

impl StubDatabase {
    pub fn new() -> Self {
        Self::with_dialect(Postgres)
    }

    pub fn with_dialect(dialect: impl Dialect + 'static) -> Self {
        Self {
            state: Arc::default(),
            dialect: Arc::new(dialect),
        }
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.lock().replies.push_back(reply);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// SQL text of every executed statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sql { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Transaction events only.
    pub fn tx_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, Event::Sql { .. }))
            .collect()
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, event: Event) {
        self.lock().events.push(event);
    }

    fn run(&self, fragment: &Fragment) -> OrmResult<Reply> {
        let compiled = fragment.compile(self.dialect());
        let mut state = self.lock();
        state.events.push(Event::Sql {
            sql: compiled.sql,
            params: compiled.params,
        });
        match state.replies.pop_front() {
            Some(Reply::Fail(message)) => Err(OrmError::driver(std::io::Error::other(message))),
            Some(reply) => Ok(reply),
            None => Err(OrmError::Other("no scripted reply".to_string())),
        }
    }
}

fn unexpected(reply: Reply) -> OrmError {
    OrmError::Other(format!("unexpected scripted reply {reply:?}"))
}

impl Executor for StubDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &*self.dialect
    }

    async fn query(&self, fragment: &Fragment) -> OrmResult<Vec<Row>> {
        match self.run(fragment)? {
            Reply::Rows(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    async fn insert_and_get(&self, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
        match self.run(fragment)? {
            Reply::Inserted(inserted) => Ok(inserted),
            other => Err(unexpected(other)),
        }
    }

    async fn update_and_get(&self, fragment: &Fragment) -> OrmResult<Option<Vec<Row>>> {
        match self.run(fragment)? {
            Reply::Updated(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    async fn execute(&self, fragment: &Fragment) -> OrmResult<u64> {
        match self.run(fragment)? {
            Reply::Affected(n) => Ok(n),
            other => Err(unexpected(other)),
        }
    }
}

impl Database for StubDatabase {
    type Tx<'a> = StubTransaction;

    async fn begin(&self) -> OrmResult<StubTransaction> {
        self.record(Event::Begin);
        Ok(StubTransaction { db: self.clone() })
    }
}

/// Transaction over the same script and log as its database.
pub struct StubTransaction {
    db: StubDatabase,
}

impl Executor for StubTransaction {
    fn dialect(&self) -> &dyn Dialect {
        self.db.dialect()
    }

    async fn query(&self, fragment: &Fragment) -> OrmResult<Vec<Row>> {
        self.db.query(fragment).await
    }

    async fn insert_and_get(&self, fragment: &Fragment) -> OrmResult<Vec<Inserted>> {
        self.db.insert_and_get(fragment).await
    }

    async fn update_and_get(&self, fragment: &Fragment) -> OrmResult<Option<Vec<Row>>> {
        self.db.update_and_get(fragment).await
    }

    async fn execute(&self, fragment: &Fragment) -> OrmResult<u64> {
        self.db.execute(fragment).await
    }
}

impl Transaction for StubTransaction {
    async fn commit(self) -> OrmResult<()> {
        self.db.record(Event::Commit);
        Ok(())
    }

    async fn rollback(self) -> OrmResult<()> {
        self.db.record(Event::Rollback);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })
    }
}

impl Model for User {
    fn to_row(&self) -> Row {
        Row::new()
            .set("id", self.id)
            .set("name", self.name.as_str())
            .set("email", self.email.clone())
    }
}

pub fn user_row(id: i64, name: &str) -> Row {
    Row::new().set("id", id).set("name", name)
}
