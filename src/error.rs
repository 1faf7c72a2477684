use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building data pools and charts.
#[derive(Debug, Error)]
pub enum Error {
    /// The user supplied series / options are structurally invalid.
    #[error("invalid specification: {0}")]
    InvalidSpecification(#[from] SpecError),

    /// A data source failed while executing a query. Passed through untouched.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl Error {
    pub fn spec(&self) -> Option<&SpecError> {
        match self {
            Error::InvalidSpecification(e) => Some(e),
            Error::Source(_) => None,
        }
    }
}

/// Diagnostics for an invalid specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("missing '{key}' in {context}")]
    MissingField { key: String, context: String },

    #[error("'{key}' must be {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("field {path:?} does not exist on '{source_name}'. Valid lookups are {valid}.")]
    UnknownFieldPath {
        path: String,
        source_name: String,
        valid: String,
    },

    #[error("'{term}' is not a term of the data pool. Allowed values are: {valid}")]
    UnknownTerm { term: String, valid: String },

    #[error("unknown source '{name}'. Registered sources are: {valid}")]
    UnknownSource { name: String, valid: String },

    #[error("'{0}' cannot be empty")]
    EmptyCollection(String),

    #[error("{0:?} is not a recognized aggregate function")]
    UnknownAggregate(String),

    #[error("{0}")]
    Malformed(String),
}

impl SpecError {
    pub fn missing(key: &str, context: impl Into<String>) -> Self {
        SpecError::MissingField {
            key: key.to_string(),
            context: context.into(),
        }
    }

    pub fn mismatch(key: &str, expected: &str, found: impl Into<String>) -> Self {
        SpecError::TypeMismatch {
            key: key.to_string(),
            expected: expected.to_string(),
            found: found.into(),
        }
    }
}
