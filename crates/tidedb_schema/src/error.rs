//! Error types for the schema engine.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur in schema operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Validation found one or more problems.
    ///
    /// Validation never short-circuits; every message describes one distinct
    /// problem with the schema.
    #[error("schema validation failed due to the following errors:\n- {}", .errors.join("\n- "))]
    Validation {
        /// One message per problem found.
        errors: Vec<String>,
    },
}

impl SchemaError {
    /// Creates a validation error from collected messages.
    #[must_use]
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    /// Returns the individual validation messages.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Validation { errors } => errors,
        }
    }
}
