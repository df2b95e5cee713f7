use crate::error::{Result, StoreError};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Validate a profile namespace: must be non-empty and match [a-zA-Z0-9_-]+
/// so it can be embedded in bucket names.
pub fn validate_namespace(ns: &str) -> Result<()> {
    if ns.is_empty() {
        return Err(StoreError::InvalidInput("namespace must not be empty".into()));
    }
    if !ns
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::InvalidInput(format!(
            "namespace '{ns}' contains invalid characters: only a-z, A-Z, 0-9, _, - allowed"
        )));
    }
    Ok(())
}

/// Task text must have something left after trimming.
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(StoreError::InvalidInput("task text must not be empty".into()));
    }
    Ok(())
}

/// Bucket names for a namespace: `(tasks, tags)`.
pub fn bucket_names(ns: &str) -> (String, String) {
    (format!("utask_tasks_{ns}"), format!("utask_tags_{ns}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_namespaces() {
        assert!(validate_namespace("default").is_ok());
        assert!(validate_namespace("team-a").is_ok());
        assert!(validate_namespace("team_a").is_ok());
        assert!(validate_namespace("Proj2").is_ok());
    }

    #[test]
    fn invalid_namespaces() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a b").is_err());
        assert!(validate_namespace("a.b").is_err());
        assert!(validate_namespace("a/b").is_err());
    }

    #[test]
    fn names_per_namespace() {
        assert_eq!(
            bucket_names("default"),
            ("utask_tasks_default".to_string(), "utask_tags_default".to_string())
        );
    }

    #[test]
    fn blank_text_rejected() {
        assert!(validate_text(" \n\t").is_err());
        assert!(validate_text("x").is_ok());
    }
}
