use std::collections::BTreeMap;

use log::info;

use super::Store;
use crate::error::Result;
use crate::kv::{Bucket, KvError, KvResult};
use crate::normalize::normalize_tags;

/// Counts from a full index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub tasks: usize,
    pub tags: usize,
    pub removed: usize,
}

/// Parse an index value: one id per line, blank lines ignored.
pub(crate) fn decode_ids(value: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(value)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn encode_ids<S: AsRef<str>>(ids: &[S]) -> Vec<u8> {
    ids.iter()
        .map(AsRef::as_ref)
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// Like `committed`, but a tag key that vanished under us (rebuild dropped
/// it) is also a lost race.
fn index_committed<T>(res: KvResult<T>) -> Result<bool> {
    match res {
        Ok(_) => Ok(true),
        Err(e) if e.is_conflict() => Ok(false),
        Err(KvError::KeyNotFound(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl<B: Bucket> Store<B> {
    /// Ids listed under `tag`; empty if the tag has no entry.
    pub(crate) fn tag_ids(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self
            .tags
            .get(tag)?
            .map(|e| decode_ids(&e.value))
            .unwrap_or_default())
    }

    pub(crate) fn append_tag_id(&self, tag: &str, id: &str) -> Result<()> {
        self.cas_loop(&self.tags, tag, || match self.tags.get(tag)? {
            // First reference; losing the create race just means retrying
            // through the update branch.
            None => Ok(index_committed(self.tags.create(tag, id.as_bytes()))?.then_some(())),
            Some(entry) => {
                let mut ids = decode_ids(&entry.value);
                if ids.iter().any(|x| x == id) {
                    return Ok(Some(()));
                }
                ids.push(id.to_string());
                let res = self.tags.update(tag, &encode_ids(&ids), entry.revision);
                Ok(index_committed(res)?.then_some(()))
            }
        })
    }

    pub(crate) fn remove_tag_id(&self, tag: &str, id: &str) -> Result<()> {
        self.cas_loop(&self.tags, tag, || {
            let Some(entry) = self.tags.get(tag)? else {
                return Ok(Some(()));
            };
            let ids = decode_ids(&entry.value);
            if !ids.iter().any(|x| x == id) {
                return Ok(Some(()));
            }
            let kept: Vec<&str> = ids.iter().map(String::as_str).filter(|x| *x != id).collect();
            let res = self.tags.update(tag, &encode_ids(&kept), entry.revision);
            Ok(index_committed(res)?.then_some(()))
        })
    }

    /// Recompute the whole tag index from the task collection.
    ///
    /// Tag keys no longer referenced by any task are deleted; every other
    /// tag key is overwritten with the recomputed list.
    pub fn rebuild_index(&self) -> Result<RebuildSummary> {
        let mut acc: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut summary = RebuildSummary::default();

        for key in self.tasks.keys()? {
            let Some(task) = self.scan_get(&key)? else {
                continue;
            };
            summary.tasks += 1;
            for tag in normalize_tags(&task.tags) {
                acc.entry(tag).or_default().push(key.clone());
            }
        }

        for key in self.tags.keys()? {
            if !acc.contains_key(&key) {
                self.tags.delete(&key, None)?;
                summary.removed += 1;
            }
        }
        for (tag, ids) in &acc {
            self.tags.put(tag, &encode_ids(ids))?;
        }
        summary.tags = acc.len();

        info!(
            "rebuilt tag index for '{}': {} tasks, {} tags, {} stale tags removed",
            self.namespace, summary.tasks, summary.tags, summary.removed
        );
        Ok(summary)
    }

    /// Tag name to number of ids in its index entry. Drifted entries give
    /// approximate counts until the next rebuild.
    pub fn list_tags(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for key in self.tags.keys()? {
            if let Some(entry) = self.tags.get(&key)? {
                counts.insert(key, decode_ids(&entry.value).len());
            }
        }
        Ok(counts)
    }
}
