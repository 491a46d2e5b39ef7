//! Database interface the repository delegates to.
//!
//! - [`Executor`] runs fragments: a connection, a pooled handle or an open transaction.
//! - [`Database`] is an executor that can also open a [`Transaction`].
//! - [`Transaction`] is a scoped handle: commit it, roll it back, or let [`finish`] choose
//!   from the outcome of the work done inside it.
//!
//! The repository never manages connections itself; implement these traits for any driver.
//! A tokio-postgres implementation lives in the `pg` module.

use crate::compile::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::fragment::Fragment;
use crate::row::Row;
use crate::value::Value;
use std::future::Future;

/// What an insert reported back.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted {
    /// Only the primary-key value (e.g. `last_insert_id`).
    Key(Value),
    /// The full stored row (e.g. `RETURNING *`).
    Row(Row),
}

/// Something that can execute fragments.
///
/// Implementations compile fragments with their own [`Dialect`] and report rows as
/// [`Row`]s. Driver failures are returned as-is (wrapped in the matching [`OrmError`]
/// variant), never retried.
pub trait Executor: Send + Sync {
    /// Placeholder and quoting rules used to compile fragments for this executor.
    fn dialect(&self) -> &dyn Dialect;

    /// Execute a query and return all rows.
    fn query(&self, fragment: &Fragment) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Execute an `INSERT` and report what the driver returned.
    ///
    /// An empty vector means the driver has no usable key or row to offer.
    fn insert_and_get(
        &self,
        fragment: &Fragment,
    ) -> impl Future<Output = OrmResult<Vec<Inserted>>> + Send;

    /// Execute an `UPDATE` and return the updated rows.
    ///
    /// `None` means the driver cannot tell which rows matched.
    fn update_and_get(
        &self,
        fragment: &Fragment,
    ) -> impl Future<Output = OrmResult<Option<Vec<Row>>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, fragment: &Fragment) -> impl Future<Output = OrmResult<u64>> + Send;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback) must roll it back.
pub trait Transaction: Executor {
    fn commit(self) -> impl Future<Output = OrmResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = OrmResult<()>> + Send;
}

/// An executor that can open transactions.
pub trait Database: Executor {
    type Tx<'a>: Transaction + 'a
    where
        Self: 'a;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = OrmResult<Self::Tx<'_>>> + Send;
}

/// Commit `tx` if `result` is `Ok`, roll it back otherwise.
///
/// A failed rollback is reported alongside the original error.
pub async fn finish<T, Tx: Transaction>(tx: Tx, result: OrmResult<T>) -> OrmResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => match tx.rollback().await {
            Ok(()) => Err(error),
            Err(rollback_err) => Err(OrmError::Other(format!(
                "{error} (rollback failed: {rollback_err})"
            ))),
        },
    }
}
