pub mod password;
pub mod validation;

pub use password::{CredentialHasher, HashingParams, Password, PasswordError, PasswordHashString};
pub use validation::{normalize_email, validate_request, validate_username};
