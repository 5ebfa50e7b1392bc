//! Unified error types for the Loom plugin runtime.
//!
//! Every crate maps its failures into [`AppError`] so that registry
//! operations, builders and the hook bus share one error surface and
//! callers can match on [`ErrorKind`].

use std::fmt;
use thiserror::Error;

/// Error categories surfaced by the plugin runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A manifest or descriptor is malformed.
    Validation,
    /// A plugin or service name is already taken.
    DuplicateName,
    /// The named plugin or service is unknown.
    NotFound,
    /// Two active plugins claim the same route prefix or admin page path.
    RouteConflict,
    /// A resolution chain (services or plugin dependencies) loops back on itself.
    CircularDependency,
    /// The requested lifecycle operation is not legal from the current state.
    InvalidTransition,
    /// A declared dependency is missing, inactive or version-incompatible.
    Dependency,
    /// A hook handler failed.
    HookExecution,
    /// A plugin lifecycle callback failed or timed out.
    LifecycleCallback,
    /// A builder was used after `build()`.
    BuilderFinalized,
    /// Runtime configuration could not be loaded.
    Configuration,
    /// A value could not be serialized or deserialized.
    Serialization,
    /// A storage collaborator failed.
    Storage,
    /// The registry has been shut down.
    Unavailable,
    /// An unexpected internal failure.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::DuplicateName => write!(f, "DUPLICATE_NAME"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::RouteConflict => write!(f, "ROUTE_CONFLICT"),
            Self::CircularDependency => write!(f, "CIRCULAR_DEPENDENCY"),
            Self::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            Self::Dependency => write!(f, "DEPENDENCY"),
            Self::HookExecution => write!(f, "HOOK_EXECUTION"),
            Self::LifecycleCallback => write!(f, "LIFECYCLE_CALLBACK"),
            Self::BuilderFinalized => write!(f, "BUILDER_FINALIZED"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Storage => write!(f, "STORAGE"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout Loom.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a duplicate-name error.
    pub fn duplicate_name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateName, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a route-conflict error.
    pub fn route_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RouteConflict, message)
    }

    /// Create a circular-dependency error.
    pub fn circular_dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircularDependency, message)
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, message)
    }

    /// Create a dependency error.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }

    /// Create a hook-execution error.
    pub fn hook_execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookExecution, message)
    }

    /// Create a lifecycle-callback error.
    pub fn lifecycle_callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LifecycleCallback, message)
    }

    /// Create a builder-finalized error.
    pub fn builder_finalized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BuilderFinalized, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = AppError::route_conflict("'/admin/cache' is already mounted");
        assert_eq!(
            err.to_string(),
            "ROUTE_CONFLICT: '/admin/cache' is already mounted"
        );
        assert!(err.is(ErrorKind::RouteConflict));
    }

    #[test]
    fn test_clone_drops_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AppError::from(json_err);
        assert!(err.source.is_some());
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Serialization);
        assert!(cloned.source.is_none());
    }
}
