//! Incident records and query results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open-ended scalar metadata attached to an incident.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Prefix of every assigned incident ID.
pub const ID_PREFIX: &str = "problem";

/// A stored problem/solution pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// `problem_<n>`, unique within the collection and never reused
    pub id: String,
    /// Free-text symptom description; this is what gets embedded
    pub problem_description: String,
    /// How the problem was resolved
    pub solution: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// One hit of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub id: String,
    pub problem: String,
    pub solution: String,
    /// `1 - distance / 2`, in `[0, 1]`
    pub similarity: f32,
    pub metadata: Metadata,
}

/// Reject metadata values that are not scalars.
pub(crate) fn validate_metadata(metadata: &Metadata) -> Result<(), String> {
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err("metadata keys must not be empty".to_string());
        }
        match value {
            serde_json::Value::String(_)
            | serde_json::Value::Number(_)
            | serde_json::Value::Bool(_) => {}
            other => {
                return Err(format!(
                    "metadata value for '{key}' must be a string, number or bool, got {other}"
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_metadata_is_accepted() {
        let mut metadata = Metadata::new();
        metadata.insert("namespace".to_string(), json!("default"));
        metadata.insert("restarts".to_string(), json!(5));
        metadata.insert("resolved".to_string(), json!(true));
        assert!(validate_metadata(&metadata).is_ok());
    }

    #[test]
    fn test_nested_metadata_is_rejected() {
        let mut metadata = Metadata::new();
        metadata.insert("labels".to_string(), json!({"app": "redis"}));
        assert!(validate_metadata(&metadata).is_err());

        let mut metadata = Metadata::new();
        metadata.insert("owner".to_string(), serde_json::Value::Null);
        assert!(validate_metadata(&metadata).is_err());
    }
}
