//! Explicit transaction scopes.
//!
//! Every write the listener performs runs inside [`in_transaction`]: the
//! closure's `Ok` commits, its `Err` rolls back and is returned unchanged.

use rusqlite::{Transaction, TransactionBehavior};

use crate::storage::Pool;
use crate::store::PersistenceError;

/// Run `f` inside a `BEGIN IMMEDIATE` transaction on a pooled connection.
///
/// `IMMEDIATE` takes the write lock up front so concurrent writers queue on
/// the busy timeout instead of failing a lock upgrade mid-transaction.
pub fn in_transaction<T, F>(pool: &Pool, f: F) -> Result<T, PersistenceError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, PersistenceError>,
{
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
