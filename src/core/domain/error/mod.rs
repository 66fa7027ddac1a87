use thiserror::Error;

/// The main error type for VM spec synchronization.
///
/// This enum represents every failure the synchronizer can surface to a
/// caller: documents that cannot be parsed, form input that does not pass
/// validation, missing collaborator resources and failed persistence.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Represents a cloud-init document that could not be parsed structurally
    ///
    /// # Fields
    /// * `0` - A description of the parse failure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Represents form input rejected before save
    ///
    /// # Fields
    /// * `errors` - Every validation message collected for the session
    #[error("Validation failed: {}", join_messages(.errors))]
    Validation { errors: Vec<ValidationError> },

    /// Represents a collaborator resource that was referenced but not found
    ///
    /// # Fields
    /// * `kind` - The resource kind (e.g. `secret`, `sshkey`)
    /// * `id` - The `namespace/name` identifier that was looked up
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// Represents a failure reported by the resource store
    ///
    /// # Fields
    /// * `0` - A description of what went wrong while persisting
    #[error("Store error: {0}")]
    Store(String),

    /// Represents JSON/YAML payloads that could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Represents an unreadable or malformed configuration source
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for SyncError {
    fn from(error: ValidationError) -> Self {
        SyncError::Validation {
            errors: vec![error],
        }
    }
}

impl From<Vec<ValidationError>> for SyncError {
    fn from(errors: Vec<ValidationError>) -> Self {
        SyncError::Validation { errors }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Specialized error type for form validation failures.
///
/// The `Display` text of each variant is the user-facing message shown next
/// to the form before save is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty
    ///
    /// # Fields
    /// * `field` - The human readable name of the field
    #[error("{field} is required.")]
    Required { field: String },

    /// A field is shorter than its minimum length
    ///
    /// # Fields
    /// * `field` - The human readable name of the field
    /// * `min` - The minimum accepted length
    #[error("{field} must contain at least {min} characters.")]
    MinLength { field: String, min: usize },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

/// Type alias for Results that may fail with a SyncError
pub type SyncResult<T> = Result<T, SyncError>;
