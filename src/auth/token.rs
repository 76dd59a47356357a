use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::{Clock, Entropy};
use crate::config::JwtSettings;
use crate::error::AppError;
use crate::models::{IssuedRefreshToken, User};

/// Role claim carried by every access token.
pub const USER_ROLE: &str = "User";

/// Size of a refresh token before encoding (256 bits).
const REFRESH_TOKEN_BYTES: usize = 32;

/// Represents the claims encoded within an access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Unique token id.
    pub jti: String,
    /// Subject of the token: the user's id in decimal.
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiration, seconds since epoch.
    pub exp: i64,
}

impl Claims {
    /// The user id held in `sub`.
    pub fn user_id(&self) -> Result<i32, AppError> {
        self.sub
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Authentication("Invalid token subject".into()))
    }
}

/// A signed access token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Creates signed access tokens and opaque refresh tokens, and validates access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
}

impl TokenIssuer {
    pub fn new(settings: JwtSettings, clock: Arc<dyn Clock>, entropy: Arc<dyn Entropy>) -> Self {
        let encoding_key = EncodingKey::from_secret(settings.signing_key.as_bytes());
        let decoding_key = DecodingKey::from_secret(settings.signing_key.as_bytes());
        Self {
            settings,
            encoding_key,
            decoding_key,
            clock,
            entropy,
        }
    }

    /// Signs an HS256 access token for `user`, valid for the configured number of minutes.
    pub fn issue_access_token(&self, user: &User) -> Result<AccessToken, AppError> {
        let now = self.clock.now();
        let expires_at = now + Duration::minutes(self.settings.access_token_minutes);
        let claims = Claims {
            jti: Uuid::new_v4().to_string(),
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: USER_ROLE.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))?;
        Ok(AccessToken { token, expires_at })
    }

    /// Mints an opaque refresh token: 256 random bits, base64-encoded.
    pub fn issue_refresh_token(&self) -> IssuedRefreshToken {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.entropy.fill_bytes(&mut bytes);
        let now = self.clock.now();
        IssuedRefreshToken {
            token: STANDARD.encode(bytes),
            created_on: now,
            expires_on: now + Duration::days(self.settings.refresh_token_days),
        }
    }

    /// Verifies signature, issuer, audience and lifetime (no clock skew allowed).
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_audience(&[self.settings.audience.as_str()]);
        validation.leeway = 0;
        // Lifetime is checked against the injected clock below.
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if self.clock.now().timestamp() >= claims.exp {
            return Err(AppError::Authentication(
                "Invalid token: ExpiredSignature".into(),
            ));
        }
        Ok(claims)
    }
}
