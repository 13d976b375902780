//! Core error types used across the system

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::money::MoneyError;

/// Category of a failure, shared by every domain error type
///
/// Callers use the kind to decide how to react: validation errors are fixed
/// by correcting input, concurrency errors are retried, lifecycle errors mean
/// the entity is in the wrong state for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected before any mutation
    Validation,
    /// Derived figures would not reconcile (allocation sums, duplicates)
    Consistency,
    /// No exchange rate could be resolved for a money movement
    Conversion,
    /// Optimistic-lock conflict; safe to retry
    Concurrency,
    /// Transition not allowed from the current state
    Lifecycle,
    /// Referenced entity does not exist
    NotFound,
    /// Actor lacks the role required for the operation
    Authorization,
}

impl ErrorKind {
    /// Returns true if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Concurrency)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Authorization => "authorization",
        };
        f.write_str(name)
    }
}

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Money(_) | CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Unauthorized(_) => ErrorKind::Authorization,
        }
    }
}
