//! Convenience result type alias for Loom.

use crate::error::AppError;

/// A specialized `Result` type for Loom operations.
pub type AppResult<T> = Result<T, AppError>;
