use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Bucket, Entry, KvError, KvResult, Revision, Substrate};

#[derive(Default)]
struct BucketState {
    seq: u64,
    entries: BTreeMap<String, Entry>,
}

impl BucketState {
    fn next_revision(&mut self) -> Revision {
        self.seq += 1;
        Revision(self.seq)
    }
}

#[derive(Default)]
struct State {
    buckets: HashMap<String, BucketState>,
    closed: bool,
}

/// In-process substrate. Clones share the same data, so several stores (or
/// threads) built from clones behave like independent clients of one server.
#[derive(Clone, Default)]
pub struct MemorySubstrate {
    state: Arc<Mutex<State>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the session. Buckets handed out earlier fail with
    /// [`KvError::Unavailable`] from now on.
    pub fn close(self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }
}

impl Substrate for MemorySubstrate {
    type Bucket = MemoryBucket;

    fn bucket(&self, name: &str) -> KvResult<MemoryBucket> {
        let mut state = lock(&self.state)?;
        state.buckets.entry(name.to_string()).or_default();
        Ok(MemoryBucket {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct MemoryBucket {
    state: Arc<Mutex<State>>,
    name: String,
}

fn lock(state: &Mutex<State>) -> KvResult<MutexGuard<'_, State>> {
    let guard = state
        .lock()
        .map_err(|_| KvError::Unavailable("memory substrate lock poisoned".into()))?;
    if guard.closed {
        return Err(KvError::Unavailable("memory substrate is closed".into()));
    }
    Ok(guard)
}

impl MemoryBucket {
    fn with<T>(&self, f: impl FnOnce(&mut BucketState) -> KvResult<T>) -> KvResult<T> {
        let mut state = lock(&self.state)?;
        let bucket = state
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| KvError::Unavailable(format!("bucket '{}' was removed", self.name)))?;
        f(bucket)
    }
}

impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> KvResult<Option<Entry>> {
        self.with(|b| Ok(b.entries.get(key).cloned()))
    }

    fn create(&self, key: &str, value: &[u8]) -> KvResult<Revision> {
        self.with(|b| {
            if b.entries.contains_key(key) {
                return Err(KvError::KeyExists(key.to_string()));
            }
            let revision = b.next_revision();
            b.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    revision,
                },
            );
            Ok(revision)
        })
    }

    fn update(&self, key: &str, value: &[u8], expected: Revision) -> KvResult<Revision> {
        self.with(|b| {
            let current = match b.entries.get(key) {
                Some(e) => e.revision,
                None => return Err(KvError::KeyNotFound(key.to_string())),
            };
            if current != expected {
                return Err(KvError::WrongRevision {
                    key: key.to_string(),
                    expected,
                    current,
                });
            }
            let revision = b.next_revision();
            b.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    revision,
                },
            );
            Ok(revision)
        })
    }

    fn put(&self, key: &str, value: &[u8]) -> KvResult<Revision> {
        self.with(|b| {
            let revision = b.next_revision();
            b.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    revision,
                },
            );
            Ok(revision)
        })
    }

    fn delete(&self, key: &str, expected: Option<Revision>) -> KvResult<()> {
        self.with(|b| {
            if let Some(expected) = expected {
                let current = match b.entries.get(key) {
                    Some(e) => e.revision,
                    None => return Err(KvError::KeyNotFound(key.to_string())),
                };
                if current != expected {
                    return Err(KvError::WrongRevision {
                        key: key.to_string(),
                        expected,
                        current,
                    });
                }
            }
            b.entries.remove(key);
            Ok(())
        })
    }

    fn keys(&self) -> KvResult<Vec<String>> {
        self.with(|b| Ok(b.entries.keys().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_existing_key() {
        let kv = MemorySubstrate::new();
        let b = kv.bucket("b").unwrap();
        b.create("k", b"one").unwrap();
        let err = b.create("k", b"two").unwrap_err();
        assert!(matches!(err, KvError::KeyExists(_)));
        assert_eq!(b.get("k").unwrap().unwrap().value, b"one");
    }

    #[test]
    fn update_requires_current_revision() {
        let kv = MemorySubstrate::new();
        let b = kv.bucket("b").unwrap();
        let r1 = b.create("k", b"one").unwrap();
        let r2 = b.update("k", b"two", r1).unwrap();
        assert!(r2 > r1);

        let err = b.update("k", b"three", r1).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(b.get("k").unwrap().unwrap().value, b"two");
    }

    #[test]
    fn conditional_delete() {
        let kv = MemorySubstrate::new();
        let b = kv.bucket("b").unwrap();
        let r1 = b.create("k", b"v").unwrap();
        b.put("k", b"w").unwrap();
        assert!(b.delete("k", Some(r1)).unwrap_err().is_conflict());

        let current = b.get("k").unwrap().unwrap().revision;
        b.delete("k", Some(current)).unwrap();
        assert!(b.get("k").unwrap().is_none());

        // Unconditional delete of a missing key is fine
        b.delete("k", None).unwrap();
    }

    #[test]
    fn clones_share_state_and_buckets_are_isolated() {
        let kv = MemorySubstrate::new();
        let other = kv.clone();
        kv.bucket("a").unwrap().put("k", b"1").unwrap();

        assert!(other.bucket("a").unwrap().get("k").unwrap().is_some());
        assert!(other.bucket("b").unwrap().get("k").unwrap().is_none());
    }

    #[test]
    fn keys_are_sorted() {
        let kv = MemorySubstrate::new();
        let b = kv.bucket("b").unwrap();
        for k in ["c", "a", "b"] {
            b.put(k, b"").unwrap();
        }
        assert_eq!(b.keys().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn closed_session_is_unavailable() {
        let kv = MemorySubstrate::new();
        let b = kv.bucket("b").unwrap();
        kv.close();
        assert!(matches!(b.get("k"), Err(KvError::Unavailable(_))));
    }
}
