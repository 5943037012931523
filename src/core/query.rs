//! Query representation.
//!
//! A [`Query`] is immutable for the duration of one request. Optional user
//! metadata (role, platform) nudges theme routing without hard-filtering.

use serde::{Deserialize, Serialize};

/// A user query plus optional profile metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Raw query text as the user typed it.
    pub text: String,

    /// Optional user profile hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UserMetadata>,
}

/// Optional per-user metadata attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// User role (e.g. `agent`, `supervisor`, `admin`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Platform hint (e.g. `android`, `ios`, `web`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl Query {
    /// Creates a query from raw text, without metadata.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }

    /// Attaches user metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: UserMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns the query text lowercased, for keyword matching.
    #[must_use]
    pub fn text_lower(&self) -> String {
        self.text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_new() {
        let query = Query::new("how to connect the sdk");
        assert_eq!(query.text, "how to connect the sdk");
        assert!(query.metadata.is_none());
    }

    #[test]
    fn test_query_with_metadata() {
        let query = Query::new("настройка тегов").with_metadata(UserMetadata {
            role: Some("admin".to_string()),
            platform: None,
        });
        assert_eq!(
            query.metadata.as_ref().and_then(|m| m.role.as_deref()),
            Some("admin")
        );
    }

    #[test]
    fn test_query_text_lower() {
        let query = Query::new("Как Настроить SDK");
        assert_eq!(query.text_lower(), "как настроить sdk");
    }

    #[test]
    fn test_query_serialization() {
        let query = Query::new("test").with_metadata(UserMetadata {
            role: None,
            platform: Some("web".to_string()),
        });
        let json = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);
    }
}
