use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest as _, Sha512};

use crate::model::TaskInput;

/// The fields that determine a task's identity, in hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Canonical {
    pub text: String,
    pub tags: Vec<String>,
    pub priority: i64,
    pub estimate_minutes: i64,
}

/// Lowercase, trim, drop empties, dedupe and sort.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Lowercase hex SHA-512 of the canonical JSON encoding.
pub fn derive_id(canonical: &Canonical) -> serde_json::Result<String> {
    let json = serde_json::to_vec(canonical)?;
    let digest = Sha512::digest(&json);
    let mut out = String::with_capacity(128);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}

/// Canonicalize `input` and derive its id. The id depends only on content:
/// no nonce or timestamp goes into it, so equal content means equal id.
pub fn normalize(input: &TaskInput) -> serde_json::Result<(Canonical, String)> {
    let canonical = Canonical {
        text: input.text.trim().to_string(),
        tags: normalize_tags(&input.tags),
        priority: input.priority,
        estimate_minutes: input.estimate_minutes,
    };
    let id = derive_id(&canonical)?;
    Ok((canonical, id))
}
