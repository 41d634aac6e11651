//! Input validation for the sign-in and sign-up forms.
//!
//! The session store only insists on non-empty fields; these stricter
//! checks run in the front end before the store is called.

use super::ValidationError;

/// Minimum password length accepted on the sign-in form
pub const MIN_LOGIN_SECRET_LENGTH: usize = 6;

/// Minimum password length for new accounts
pub const MIN_NEW_SECRET_LENGTH: usize = 8;

/// Reject empty or whitespace-only input
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Check that an email looks like `local@domain.tld` with no whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    require("Email", email)?;
    if is_valid_email(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_login_secret(secret: &str) -> Result<(), ValidationError> {
    require("Password", secret)?;
    if secret.chars().count() < MIN_LOGIN_SECRET_LENGTH {
        return Err(ValidationError::SecretTooShort { min: MIN_LOGIN_SECRET_LENGTH });
    }
    Ok(())
}

/// Password policy for new accounts: length plus mixed case and a digit
pub fn validate_new_secret(secret: &str) -> Result<(), ValidationError> {
    require("Password", secret)?;
    if secret.chars().count() < MIN_NEW_SECRET_LENGTH {
        return Err(ValidationError::SecretTooShort { min: MIN_NEW_SECRET_LENGTH });
    }
    let has_lower = secret.chars().any(|c| c.is_lowercase());
    let has_upper = secret.chars().any(|c| c.is_uppercase());
    let has_digit = secret.chars().any(|c| c.is_ascii_digit());
    if has_lower && has_upper && has_digit {
        Ok(())
    } else {
        Err(ValidationError::WeakSecret)
    }
}

pub fn validate_confirmation(secret: &str, confirmation: &str) -> Result<(), ValidationError> {
    require("Password confirmation", confirmation)?;
    if secret == confirmation {
        Ok(())
    } else {
        Err(ValidationError::ConfirmationMismatch)
    }
}
