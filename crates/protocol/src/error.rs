//! Shared error taxonomy (spec §7). Kinds, not one giant enum per crate:
//! each subsystem maps its local failures into one of these before it
//! crosses a crate boundary.

use thiserror::Error;

/// I/O failure, format corruption, or atomic-write rename failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as {format}: {source}")]
    Format {
        path: String,
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("atomic write to {path} failed during rename: {source}")]
    AtomicRename {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("lock acquisition for {path} timed out after {timeout_secs}s")]
    LockTimeout { path: String, timeout_secs: u64 },
    #[error("requested file not found: {0}")]
    NotFound(String),
}

/// Bad path token, malformed chapter id, or schema parse failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path token '{0}' is invalid or empty after sanitization")]
    InvalidPathToken(String),
    #[error("resolved path escapes the data root: {0}")]
    PathEscapesRoot(String),
    #[error("'{0}' is not a recognizable chapter id")]
    InvalidChapterId(String),
    #[error("schema validation failed: {0}")]
    Schema(String),
}

/// Timeout/connection/rate-limit/server vs. auth/permission/invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LLMError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("non-retryable failure: {0}")]
    Permanent(String),
}

impl LLMError {
    /// Classifies an error message/kind into retryable vs. fail-fast,
    /// per spec §5's substring-matching policy.
    pub fn classify(message: &str) -> LLMErrorClass {
        let lower = message.to_lowercase();
        const PERMANENT_MARKERS: &[&str] = &["auth", "permission", "invalid", "forbidden", "401", "403"];
        const TRANSIENT_MARKERS: &[&str] = &["timeout", "connection", "5", "429", "rate limit", "temporarily"];
        if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
            LLMErrorClass::Permanent
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            LLMErrorClass::Transient
        } else {
            // Unknown shape: default to transient so a flaky gateway
            // doesn't fail a whole session on one unmatched message.
            LLMErrorClass::Transient
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMErrorClass {
    Transient,
    Permanent,
}

/// Scene brief missing, draft content missing, or a session invariant
/// broken.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("scene brief missing for chapter")]
    MissingSceneBrief,
    #[error("draft content missing for chapter")]
    MissingDraft,
    #[error("session invariant violated: {0}")]
    InvariantViolated(String),
    #[error("maximum iterations reached")]
    MaxIterationsReached,
    #[error("llm gateway error: {0}")]
    Llm(#[from] LLMError),
}
