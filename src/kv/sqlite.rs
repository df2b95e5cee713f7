use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{Bucket, Entry, KvError, KvResult, Revision, Substrate};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY CHECK(length(name) > 0),
    seq  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS entries (
    bucket   TEXT NOT NULL REFERENCES buckets(name) ON DELETE CASCADE,
    key      TEXT NOT NULL,
    value    BLOB NOT NULL,
    revision INTEGER NOT NULL,
    PRIMARY KEY (bucket, key)
);
";

fn set_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA busy_timeout = 5000;
         PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

/// Substrate backed by one SQLite database file.
///
/// Every write runs in an `IMMEDIATE` transaction that bumps the bucket's
/// sequence and checks the expected revision, so separate connections to the
/// same file (other threads, other processes) get per-key CAS.
#[derive(Clone)]
pub struct SqliteSubstrate {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubstrate {
    pub fn open(path: &str) -> KvResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_memory() -> KvResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> KvResult<Self> {
        set_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Close the connection. If buckets handed out by this session are still
    /// alive the connection stays open until the last one is dropped.
    pub fn close(self) -> KvResult<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|_| KvError::Unavailable("sqlite connection lock poisoned".into()))?;
                conn.close().map_err(|(_, e)| KvError::Backend(e))
            }
            Err(conn) => {
                debug!(
                    "sqlite connection still shared by {} bucket handles; closing when they drop",
                    Arc::strong_count(&conn) - 1
                );
                Ok(())
            }
        }
    }
}

impl Substrate for SqliteSubstrate {
    type Bucket = SqliteBucket;

    fn bucket(&self, name: &str) -> KvResult<SqliteBucket> {
        lock(&self.conn)?.execute("INSERT OR IGNORE INTO buckets (name) VALUES (?1)", [name])?;
        Ok(SqliteBucket {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct SqliteBucket {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

fn lock(conn: &Mutex<Connection>) -> KvResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| KvError::Unavailable("sqlite connection lock poisoned".into()))
}

fn current_revision(tx: &Transaction, bucket: &str, key: &str) -> KvResult<Option<Revision>> {
    let rev: Option<i64> = tx
        .query_row(
            "SELECT revision FROM entries WHERE bucket = ?1 AND key = ?2",
            [bucket, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rev.map(|r| Revision(r as u64)))
}

fn next_revision(tx: &Transaction, bucket: &str) -> KvResult<Revision> {
    tx.execute("UPDATE buckets SET seq = seq + 1 WHERE name = ?1", [bucket])?;
    let seq: i64 = tx.query_row("SELECT seq FROM buckets WHERE name = ?1", [bucket], |row| {
        row.get(0)
    })?;
    Ok(Revision(seq as u64))
}

fn check_revision(key: &str, current: Option<Revision>, expected: Revision) -> KvResult<()> {
    match current {
        None => Err(KvError::KeyNotFound(key.to_string())),
        Some(current) if current != expected => Err(KvError::WrongRevision {
            key: key.to_string(),
            expected,
            current,
        }),
        Some(_) => Ok(()),
    }
}

const UPSERT: &str = "
INSERT INTO entries (bucket, key, value, revision) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(bucket, key) DO UPDATE SET value = excluded.value, revision = excluded.revision
";

impl SqliteBucket {
    /// Run `f` inside an `IMMEDIATE` transaction; commit only if it succeeds.
    fn write<T>(&self, f: impl FnOnce(&Transaction) -> KvResult<T>) -> KvResult<T> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn store(&self, tx: &Transaction, key: &str, value: &[u8]) -> KvResult<Revision> {
        let revision = next_revision(tx, &self.name)?;
        tx.execute(
            UPSERT,
            rusqlite::params![self.name, key, value, revision.0 as i64],
        )?;
        Ok(revision)
    }
}

impl Bucket for SqliteBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> KvResult<Option<Entry>> {
        let conn = lock(&self.conn)?;
        let entry = conn
            .query_row(
                "SELECT value, revision FROM entries WHERE bucket = ?1 AND key = ?2",
                [self.name.as_str(), key],
                |row| {
                    Ok(Entry {
                        value: row.get(0)?,
                        revision: Revision(row.get::<_, i64>(1)? as u64),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn create(&self, key: &str, value: &[u8]) -> KvResult<Revision> {
        self.write(|tx| {
            if current_revision(tx, &self.name, key)?.is_some() {
                return Err(KvError::KeyExists(key.to_string()));
            }
            self.store(tx, key, value)
        })
    }

    fn update(&self, key: &str, value: &[u8], expected: Revision) -> KvResult<Revision> {
        self.write(|tx| {
            check_revision(key, current_revision(tx, &self.name, key)?, expected)?;
            self.store(tx, key, value)
        })
    }

    fn put(&self, key: &str, value: &[u8]) -> KvResult<Revision> {
        self.write(|tx| self.store(tx, key, value))
    }

    fn delete(&self, key: &str, expected: Option<Revision>) -> KvResult<()> {
        self.write(|tx| {
            if let Some(expected) = expected {
                check_revision(key, current_revision(tx, &self.name, key)?, expected)?;
            }
            tx.execute(
                "DELETE FROM entries WHERE bucket = ?1 AND key = ?2",
                [self.name.as_str(), key],
            )?;
            Ok(())
        })
    }

    fn keys(&self) -> KvResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare_cached("SELECT key FROM entries WHERE bucket = ?1 ORDER BY key")?;
        let rows = stmt.query_map([self.name.as_str()], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(Into::into)
    }
}
