pub mod extractors;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

// Re-export necessary items
pub use extractors::AuthenticatedUserId;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password, PasswordHasher};
pub use service::AuthService;
pub use token::{AccessToken, Claims, TokenIssuer};

lazy_static! {
    static ref UPPERCASE: regex::Regex = regex::Regex::new(r"[A-Z]").unwrap();
    static ref LOWERCASE: regex::Regex = regex::Regex::new(r"[a-z]").unwrap();
    static ref DIGIT: regex::Regex = regex::Regex::new(r"\d").unwrap();
    static ref SPECIAL: regex::Regex = regex::Regex::new(r"[\W_]").unwrap();
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::from(message));
    error
}

/// Password complexity: at least one upper-case letter, lower-case letter, digit and
/// special character. Length is checked separately.
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if !UPPERCASE.is_match(password) {
        return Err(rule(
            "uppercase",
            "Password must contain at least one uppercase letter.",
        ));
    }
    if !LOWERCASE.is_match(password) {
        return Err(rule(
            "lowercase",
            "Password must contain at least one lowercase letter.",
        ));
    }
    if !DIGIT.is_match(password) {
        return Err(rule("digit", "Password must contain at least one digit."));
    }
    if !SPECIAL.is_match(password) {
        return Err(rule(
            "special",
            "Password must contain at least one special character.",
        ));
    }
    Ok(())
}

/// Represents the payload for a user login request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name, 1 to 50 characters.
    #[validate(length(
        min = 1,
        max = 50,
        message = "Name is required and must not exceed 50 characters."
    ))]
    pub name: String,
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    /// At least 8 characters with upper, lower, digit and special characters.
    #[validate(
        length(min = 8, message = "Password must be at least 8 characters long."),
        custom = "validate_password_strength"
    )]
    pub password: String,
}

/// Response structure after a successful register, login or refresh.
///
/// The refresh token is handed to the HTTP layer, which moves it into a cookie; it is
/// never part of the JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub is_authenticated: bool,
    /// The signed access token.
    pub token: String,
    pub user_id: i32,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: String,
    pub refresh_token_expires_on: DateTime<Utc>,
}
