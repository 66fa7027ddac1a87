use crate::core::domain::error::ValidationError;

/// Minimum length of a password reset through the guest agent.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// A password pushed to the guest by an access-credential row.
#[derive(Debug, Clone)]
pub struct CredentialPassword(String);

impl CredentialPassword {
    /// Creates a validated password.
    pub fn new(password: impl Into<String>) -> Result<Self, ValidationError> {
        let password = password.into();
        validate_password(&password)?;
        Ok(Self(password))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates a password according to the guest-agent reset rules.
pub(crate) fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::required("Password"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::MinLength {
            field: "Password".to_string(),
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}
