//! Project/volume identity and path-safety sanitization (spec §3, §4.2).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sanitize a user-supplied id (`project_id`, `chapter`, card name) into a
/// safe path token: replace spaces with `_`, strip `..`, strip path
/// separators, collapse repeated `_`, trim leading/trailing `._`.
pub fn sanitize_path_token(raw: &str) -> Result<String, ValidationError> {
    let mut s = raw.replace(' ', "_");
    s = s.replace("..", "");
    s = s.replace(['/', '\\'], "");

    let mut collapsed = String::with_capacity(s.len());
    let mut last_was_underscore = false;
    for ch in s.chars() {
        if ch == '_' {
            if !last_was_underscore {
                collapsed.push(ch);
            }
            last_was_underscore = true;
        } else {
            collapsed.push(ch);
            last_was_underscore = false;
        }
    }

    let trimmed = collapsed.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidPathToken(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

/// A project: an opaque id, sanitized to a safe path token, owning a
/// filesystem subtree exclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        Ok(Self(sanitize_path_token(raw)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `{id: V<n>, title, summary?, order}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub order: u32,
}

impl Volume {
    /// The default volume auto-created for a new project.
    pub fn default_volume() -> Self {
        Self {
            id: "V1".to_string(),
            title: "Volume 1".to_string(),
            summary: None,
            order: 1,
        }
    }
}
