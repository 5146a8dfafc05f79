//! Error types for sqlassoc.

use thiserror::Error;

/// Boxed error coming back from the execution engine, kept opaque.
pub type VendorError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for criteria compilation and association population.
#[derive(Debug, Error)]
pub enum AssocError {
    /// Malformed aggregate / groupBy combination.
    #[error("Invalid aggregate request: {0}")]
    InvalidAggregateRequest(String),

    /// A predicate, projection or sort references an attribute the collection does not have.
    #[error("Unknown attribute `{attribute}` in collection `{collection}`")]
    UnknownAttribute {
        collection: String,
        attribute: String,
    },

    /// Target collection is not registered on the connection.
    #[error("Unknown collection `{0}`")]
    UnknownCollection(String),

    /// Criteria could not be decoded (bad shape, unsupported operator).
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Error raised by the execution engine, payload preserved.
    #[error("Vendor execution error: {0}")]
    VendorExecution(#[source] VendorError),

    /// A collection's primary key cannot be determined. Configuration defect.
    #[error("Unable to determine primary key for collection `{collection}`: {reason}")]
    PrimaryKeyResolution { collection: String, reason: String },

    /// The selected dialect does not implement the operation.
    #[error("Dialect `{dialect}` does not support {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: &'static str,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssocError {
    /// Create an unknown attribute error.
    pub fn unknown_attribute(collection: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            collection: collection.into(),
            attribute: attribute.into(),
        }
    }

    /// Wrap an execution engine error.
    pub fn vendor(err: impl Into<VendorError>) -> Self {
        Self::VendorExecution(err.into())
    }

    /// Whether this error signals a configuration defect rather than a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PrimaryKeyResolution { .. } | Self::Config(_))
    }
}

/// Result type alias for sqlassoc operations.
pub type AssocResult<T> = Result<T, AssocError>;
