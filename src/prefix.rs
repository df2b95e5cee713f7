//! Git-style short id resolution.

use crate::error::{Result, StoreError};

/// Length callers should show when abbreviating ids. Not enforced.
pub const RECOMMENDED_PREFIX_LEN: usize = 8;

/// Abbreviate an id for display.
pub fn short_id(id: &str) -> &str {
    id.get(..RECOMMENDED_PREFIX_LEN).unwrap_or(id)
}

/// Resolve `prefix` against `ids`. Exactly one match wins; several matches
/// fail with the sorted candidate list.
pub fn match_prefix<I, S>(ids: I, prefix: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(StoreError::InvalidInput("empty id prefix".into()));
    }
    let mut matches: Vec<String> = ids
        .into_iter()
        .filter(|id| id.as_ref().starts_with(prefix))
        .map(|id| id.as_ref().to_string())
        .collect();
    matches.sort();
    matches.dedup();
    match matches.len() {
        0 => Err(StoreError::NotFound(format!("no task matches '{prefix}'"))),
        1 => Ok(matches.remove(0)),
        _ => Err(StoreError::Ambiguous {
            prefix: prefix.to_string(),
            candidates: matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 3] = ["abc12345deadbeef", "abc9ffff0000", "beadfeed"];

    #[test]
    fn unmatched_prefix_is_not_found() {
        assert!(matches!(
            match_prefix(KEYS, "dead"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn unique_prefix_resolves() {
        assert_eq!(match_prefix(KEYS, "bead").unwrap(), "beadfeed");
    }

    #[test]
    fn shared_prefix_is_ambiguous() {
        match match_prefix(KEYS, "abc") {
            Err(StoreError::Ambiguous { prefix, candidates }) => {
                assert_eq!(prefix, "abc");
                assert_eq!(candidates, vec!["abc12345deadbeef", "abc9ffff0000"]);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn full_id_resolves() {
        assert_eq!(match_prefix(KEYS, "abc9ffff0000").unwrap(), "abc9ffff0000");
    }

    #[test]
    fn empty_prefix_is_invalid() {
        assert!(matches!(
            match_prefix(KEYS, "  "),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
