//! Revisioned key-value substrate.
//!
//! The store never talks to a database directly. It is written against
//! [`Bucket`], a single named key space where every write bumps a
//! monotonically increasing [`Revision`] and conditional writes succeed only
//! if the caller's revision still matches. Cross-key operations are not
//! atomic; callers coordinate per key.

pub mod memory;
pub mod sqlite;

use std::fmt;

use thiserror::Error;

pub use memory::{MemoryBucket, MemorySubstrate};
pub use sqlite::{SqliteBucket, SqliteSubstrate};

/// Opaque write generation of a key. Only meaningful for the bucket that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub(crate) u64);

impl Revision {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value together with the revision that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub revision: Revision,
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key '{0}' already exists")]
    KeyExists(String),

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("key '{key}' is at revision {current}, expected {expected}")]
    WrongRevision {
        key: String,
        expected: Revision,
        current: Revision,
    },

    #[error("sqlite: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("{0}")]
    Unavailable(String),
}

impl KvError {
    /// True for errors that mean another writer got there first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KeyExists(_) | Self::WrongRevision { .. })
    }
}

pub type KvResult<T> = std::result::Result<T, KvError>;

pub trait Bucket {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> KvResult<Option<Entry>>;

    /// Insert only if `key` is absent.
    fn create(&self, key: &str, value: &[u8]) -> KvResult<Revision>;

    /// Overwrite only if `key` is still at `expected`.
    fn update(&self, key: &str, value: &[u8], expected: Revision) -> KvResult<Revision>;

    /// Unconditional upsert.
    fn put(&self, key: &str, value: &[u8]) -> KvResult<Revision>;

    /// With `Some(expected)` the delete is conditional; with `None` it is
    /// unconditional and deleting a missing key succeeds.
    fn delete(&self, key: &str, expected: Option<Revision>) -> KvResult<()>;

    /// All keys, sorted.
    fn keys(&self) -> KvResult<Vec<String>>;
}

/// A session against a shared substrate that hands out buckets.
pub trait Substrate {
    type Bucket: Bucket;

    /// Open the named bucket, creating it if it does not exist yet.
    fn bucket(&self, name: &str) -> KvResult<Self::Bucket>;
}
