//! Error types shared across the service.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, LecternError>;

/// Collaborator step that failed during certificate artifact handling.
///
/// Carried inside [`LecternError::Dependency`] and in artifact outcomes so
/// callers know which step to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStep {
    /// PDF rendering
    Render,
    /// Artifact upload to the blob store
    Upload,
    /// Artifact deletion from the blob store
    Delete,
    /// Notification delivery
    Notify,
}

impl std::fmt::Display for DependencyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyStep::Render => write!(f, "render"),
            DependencyStep::Upload => write!(f, "upload"),
            DependencyStep::Delete => write!(f, "delete"),
            DependencyStep::Notify => write!(f, "notify"),
        }
    }
}

/// Error taxonomy for Lectern
///
/// The first four variants map directly onto HTTP statuses at the route
/// boundary (400, 404, 409, 502); the rest are internal failures that
/// surface as 500 with a generic message outside dev mode.
#[derive(Error, Debug)]
pub enum LecternError {
    /// Malformed or out-of-range input; rejected before any mutation
    #[error("validation error: {0}")]
    Validation(String),

    /// No record for the given keys; rejected before any mutation
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate-key race or illegal state transition; caller re-reads
    #[error("conflict: {0}")]
    Conflict(String),

    /// External collaborator failure; already-durable state is never rolled back
    #[error("dependency failure at {step} step: {message}")]
    Dependency {
        step: DependencyStep,
        message: String,
    },

    /// MongoDB error
    #[error("database error: {0}")]
    Database(String),

    /// HTTP plumbing error (bad body, oversized payload)
    #[error("http error: {0}")]
    Http(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl LecternError {
    /// Whether this error may expose internals and should be masked in production
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LecternError::Database(_) | LecternError::Http(_) | LecternError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_step_display() {
        assert_eq!(DependencyStep::Upload.to_string(), "upload");
        assert_eq!(DependencyStep::Render.to_string(), "render");
    }

    #[test]
    fn test_internal_classification() {
        assert!(LecternError::Database("boom".into()).is_internal());
        assert!(!LecternError::Validation("bad".into()).is_internal());
        assert!(!LecternError::Conflict("dup".into()).is_internal());
    }
}
