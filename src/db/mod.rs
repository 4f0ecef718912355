pub mod migrations;
pub mod queries;

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Shared handle to the reservation database.
///
/// Every write goes through [`Store::transaction`], which opens the SQLite
/// transaction with `BEGIN IMMEDIATE` so the write lock is held before the
/// first read. Closures passed in must not await: a transaction either runs
/// to commit or is rolled back when the closure returns an error.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(init_db(path)?))
    }

    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside one immediate transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin transaction")?;

        let value = f(&tx)?;

        tx.commit().context("failed to commit transaction")?;
        Ok(value)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = Store::open(":memory:").unwrap();

        let result: anyhow::Result<()> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO facilities (name, address, start_hour, end_hour, slots_per_hour)
                 VALUES ('x', 'y', 8, 18, 10)",
                [],
            )?;
            Err(anyhow::anyhow!("abort"))
        });
        assert!(result.is_err());

        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM facilities", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let store = Store::open(":memory:").unwrap();

        let id: anyhow::Result<i64> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO facilities (name, address, start_hour, end_hour, slots_per_hour)
                 VALUES ('x', 'y', 8, 18, 10)",
                [],
            )?;
            Ok(tx.last_insert_rowid())
        });
        assert_eq!(id.unwrap(), 1);

        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM facilities", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }
}
