//! Secret scoping types.

use serde::{Deserialize, Serialize};

/// The scope a secret belongs to.
///
/// Workspace-scoped secrets take precedence over global ones during
/// resolution; the CLI's `login` stores its key under the active workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum SecretScope {
    /// Available to every workspace.
    Global,
    /// Scoped to a named workspace (e.g. "lamel-mo/default").
    Workspace(String),
}

/// Metadata about a stored secret (no value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub key: String,
    pub scope: SecretScope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_scope_serde() {
        let scope = SecretScope::Workspace("lamel-mo/default".to_string());
        let json = serde_json::to_string(&scope).unwrap();
        assert!(json.contains("\"type\":\"workspace\""));
        let parsed: SecretScope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, scope);
    }

    #[test]
    fn test_secret_entry_roundtrip() {
        let entry = SecretEntry {
            key: "EXTRACT_API_KEY".to_string(),
            scope: SecretScope::Global,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: SecretEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
