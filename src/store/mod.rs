//! Task entities and their tag index on top of a [`Bucket`] pair.
//!
//! Entities live in `utask_tasks_<ns>` keyed by their content-derived id.
//! The tag index lives in `utask_tags_<ns>` as newline-separated id lists.
//! The two collections are written separately, so the index may lag behind
//! the entities after a partial failure; [`Store::rebuild_index`] derives it
//! again from the entities.

mod index;

use std::collections::{BTreeSet, HashSet};

use chrono::{SecondsFormat, Utc};
use log::{debug, warn};

pub use index::RebuildSummary;

use crate::error::{Result, StoreError};
use crate::kv::{Bucket, KvError, KvResult, Revision, Substrate};
use crate::model::{StatusFilter, Task, TaskInput, UpdateSet};
use crate::normalize::{normalize, normalize_tags};
use crate::prefix::{match_prefix, short_id};
use crate::validate::{bucket_names, validate_namespace, validate_text};

pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 10;

pub struct Store<B> {
    tasks: B,
    tags: B,
    namespace: String,
    max_attempts: u32,
}

fn decode_task(key: &str, value: &[u8]) -> Result<Task> {
    serde_json::from_slice(value).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

fn encode_task(task: &Task) -> Result<Vec<u8>> {
    serde_json::to_vec(task).map_err(|source| StoreError::Corrupt {
        key: task.id.clone(),
        source,
    })
}

/// `Ok(true)` if the write landed, `Ok(false)` if another writer won.
fn committed<T>(res: KvResult<T>) -> Result<bool> {
    match res {
        Ok(_) => Ok(true),
        Err(e) if e.is_conflict() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn apply_patch(before: &Task, set: &UpdateSet) -> Task {
    let mut after = before.clone();
    if let Some(text) = &set.text {
        after.text = text.trim().to_string();
    }
    if let Some(done) = set.done {
        after.done = done;
    }
    if let Some(tags) = &set.tags {
        after.tags = normalize_tags(tags);
    }
    if let Some(priority) = set.priority {
        after.priority = priority;
    }
    if let Some(estimate) = set.estimate_minutes {
        after.estimate_minutes = estimate;
    }
    after
}

impl<B: Bucket> Store<B> {
    /// Open the namespace's task and tag buckets on `substrate`.
    pub fn open<S>(substrate: &S, namespace: &str) -> Result<Self>
    where
        S: Substrate<Bucket = B>,
    {
        validate_namespace(namespace)?;
        let (tasks_name, tags_name) = bucket_names(namespace);
        let tasks = substrate.bucket(&tasks_name)?;
        let tags = substrate.bucket(&tags_name)?;
        debug!("opened store for namespace '{namespace}'");
        Ok(Self::from_buckets(tasks, tags, namespace))
    }

    /// Build a store from already opened buckets.
    pub fn from_buckets(tasks: B, tags: B, namespace: &str) -> Self {
        Self {
            tasks,
            tags,
            namespace: namespace.to_string(),
            max_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Release the bucket handles.
    pub fn close(self) {
        debug!("closed store for namespace '{}'", self.namespace);
    }

    /// Run one fetch-modify-write attempt at a time until it commits.
    /// `attempt` returns `Ok(None)` when its conditional write lost a race.
    fn cas_loop<T>(
        &self,
        bucket: &B,
        key: &str,
        mut attempt: impl FnMut() -> Result<Option<T>>,
    ) -> Result<T> {
        for n in 1..=self.max_attempts {
            if let Some(out) = attempt()? {
                return Ok(out);
            }
            debug!(
                "cas conflict on {}/{} (attempt {n}/{})",
                bucket.name(),
                short_id(key),
                self.max_attempts
            );
        }
        Err(StoreError::ConflictRetryExhausted {
            key: format!("{}/{}", bucket.name(), key),
            attempts: self.max_attempts,
        })
    }

    /// Create a task, or return the existing one with the same content.
    ///
    /// The returned flag is `true` when the task already existed. If the
    /// entity write succeeds but an index write fails, the error is returned
    /// and the entity stays; [`Store::rebuild_index`] repairs the index.
    pub fn create(&self, input: &TaskInput) -> Result<(Task, bool)> {
        validate_text(&input.text)?;
        let (canonical, id) = normalize(input)
            .map_err(|e| StoreError::InvalidInput(format!("task cannot be encoded: {e}")))?;
        let task = Task {
            id,
            text: canonical.text,
            done: false,
            tags: canonical.tags,
            created: now_rfc3339(),
            priority: canonical.priority,
            estimate_minutes: canonical.estimate_minutes,
        };

        match self.tasks.create(&task.id, &encode_task(&task)?) {
            Ok(_) => {}
            Err(KvError::KeyExists(_)) => {
                debug!("task {} already exists", short_id(&task.id));
                let (existing, _) = self.get(&task.id)?;
                return Ok((existing, true));
            }
            Err(e) => return Err(e.into()),
        }

        self.apply_tag_diff(&task.id, &[], &task.tags)?;
        Ok((task, false))
    }

    pub fn get(&self, id: &str) -> Result<(Task, Revision)> {
        match self.tasks.get(id)? {
            Some(entry) => Ok((decode_task(id, &entry.value)?, entry.revision)),
            None => Err(StoreError::NotFound(format!("task '{id}'"))),
        }
    }

    fn try_get(&self, id: &str) -> Result<Option<Task>> {
        match self.tasks.get(id)? {
            Some(entry) => Ok(Some(decode_task(id, &entry.value)?)),
            None => Ok(None),
        }
    }

    /// Like `try_get`, but an undecodable entity is logged and skipped.
    /// Used by reads that walk many ids.
    fn scan_get(&self, id: &str) -> Result<Option<Task>> {
        match self.try_get(id) {
            Err(StoreError::Corrupt { key, source }) => {
                warn!("skipping corrupt task {key}: {source}");
                Ok(None)
            }
            other => other,
        }
    }

    /// Apply a sparse patch. The id never changes, even when the text or
    /// tags do.
    pub fn update(&self, id: &str, set: &UpdateSet) -> Result<Task> {
        if let Some(text) = &set.text {
            validate_text(text)?;
        }
        let (before, after) = self.cas_loop(&self.tasks, id, || {
            let (before, revision) = self.get(id)?;
            let after = apply_patch(&before, set);
            if after == before {
                return Ok(Some((before, after)));
            }
            let landed = committed(self.tasks.update(id, &encode_task(&after)?, revision))?;
            Ok(landed.then_some((before, after)))
        })?;
        self.apply_tag_diff(id, &before.tags, &after.tags)?;
        Ok(after)
    }

    /// Delete a task and drop it from the index entries of its tags.
    pub fn delete(&self, id: &str) -> Result<String> {
        let task = self.cas_loop(&self.tasks, id, || {
            let (task, revision) = self.get(id)?;
            let landed = committed(self.tasks.delete(id, Some(revision)))?;
            Ok(landed.then_some(task))
        })?;
        self.apply_tag_diff(id, &task.tags, &[])?;
        Ok(task.id)
    }

    /// Mark a task done. The flag is `false` if it already was.
    pub fn close_task(&self, id: &str) -> Result<(Task, bool)> {
        self.set_done(id, true)
    }

    /// Mark a task open again. The flag is `false` if it already was.
    pub fn reopen_task(&self, id: &str) -> Result<(Task, bool)> {
        self.set_done(id, false)
    }

    fn set_done(&self, id: &str, done: bool) -> Result<(Task, bool)> {
        self.cas_loop(&self.tasks, id, || {
            let (mut task, revision) = self.get(id)?;
            if task.done == done {
                return Ok(Some((task, false)));
            }
            task.done = done;
            let landed = committed(self.tasks.update(id, &encode_task(&task)?, revision))?;
            Ok(landed.then_some((task, true)))
        })
    }

    /// Add `id` to newly referenced tags and remove it from dropped ones.
    /// Every tag is attempted; the first failure is returned afterwards.
    fn apply_tag_diff(&self, id: &str, before: &[String], after: &[String]) -> Result<()> {
        let before: BTreeSet<&str> = before.iter().map(String::as_str).collect();
        let after: BTreeSet<&str> = after.iter().map(String::as_str).collect();
        let mut first_err = None;

        for tag in after.difference(&before) {
            if let Err(e) = self.append_tag_id(tag, id) {
                warn!(
                    "tag index '{tag}' is missing {}: {e}; run rebuild-index",
                    short_id(id)
                );
                first_err.get_or_insert(e);
            }
        }
        for tag in before.difference(&after) {
            if let Err(e) = self.remove_tag_id(tag, id) {
                warn!(
                    "tag index '{tag}' still lists {}: {e}; run rebuild-index",
                    short_id(id)
                );
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Fetch `ids` in order, skipping repeats, ids without an entity (index
    /// drift) and entities that fail to decode.
    fn fetch_all<I>(&self, ids: I, status: Option<StatusFilter>, limit: usize) -> Result<Vec<Task>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            if limit > 0 && out.len() >= limit {
                break;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(task) = self.scan_get(&id)? else {
                debug!("skipping unresolvable id {}", short_id(&id));
                continue;
            };
            if status.map_or(true, |s| s.matches(&task)) {
                out.push(task);
            }
        }
        Ok(out)
    }

    /// List tasks carrying `tag` (via the index), or every task in id order.
    pub fn list(&self, tag: Option<&str>, status: Option<StatusFilter>) -> Result<Vec<Task>> {
        let tag = tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
        let ids = match tag {
            Some(tag) => self.tag_ids(&tag)?,
            None => self.tasks.keys()?,
        };
        self.fetch_all(ids, status, 0)
    }

    /// Tasks carrying any of `any` (every task if empty) and all of `all`,
    /// in id order. `limit == 0` means unbounded.
    pub fn query(&self, any: &[&str], all: &[&str], limit: usize) -> Result<Vec<Task>> {
        let any = normalize_tags(any);
        let all = normalize_tags(all);

        let mut ids: BTreeSet<String> = if any.is_empty() {
            self.tasks.keys()?.into_iter().collect()
        } else {
            let mut union = BTreeSet::new();
            for tag in &any {
                union.extend(self.tag_ids(tag)?);
            }
            union
        };

        for tag in &all {
            if ids.is_empty() {
                break;
            }
            let members: HashSet<String> = self.tag_ids(tag)?.into_iter().collect();
            ids.retain(|id| members.contains(id));
        }

        self.fetch_all(ids, None, limit)
    }

    /// Resolve a Git-style id prefix against every stored task id.
    pub fn resolve(&self, prefix: &str) -> Result<String> {
        match_prefix(self.tasks.keys()?, prefix)
    }
}
