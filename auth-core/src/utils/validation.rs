use validator::{Validate, ValidationError};

use crate::services::AuthError;

/// Run the `validator` rules of a request, mapping failures to
/// [`AuthError::Validation`].
pub fn validate_request<T: Validate>(req: &T) -> Result<(), AuthError> {
    req.validate()?;
    Ok(())
}

/// Usernames: 3-32 characters of ASCII letters, digits, `_`, `.` or `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');

    if !username.chars().all(allowed) {
        let mut err = ValidationError::new("username_charset");
        err.message = Some("username may only contain letters, digits, '_', '.' and '-'".into());
        return Err(err);
    }
    Ok(())
}

/// Emails are unique case-insensitively; store and compare them lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
