//! Account registration, login, and the refresh-token lifecycle.
//!
//! A refresh token is issued, stays active until it expires or is revoked, and never
//! becomes active again afterwards. Refreshing revokes the presented token and issues
//! its replacement in a single storage write.

use log::{debug, info, warn};
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use super::password::PasswordHasher;
use super::token::TokenIssuer;
use super::{rule, AuthResponse, LoginRequest, RegisterRequest};
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{NewUser, RefreshToken, User};
use crate::store::Store;

const INVALID_CREDENTIALS: &str = "Invalid email or password.";
const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token.";
const NOT_REVOCABLE: &str = "Token already revoked or not found.";

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            clock,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Creates an account together with its first refresh token.
    ///
    /// Every broken rule, including an already registered email, is reported in one
    /// validation error.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        let mut errors = request.validate().err().unwrap_or_else(ValidationErrors::new);
        if self.store.email_exists(&request.email).await? {
            errors.add("email", rule("duplicate", "Email already exists."));
        }
        if !errors.errors().is_empty() {
            let error = AppError::from(errors);
            debug!("Registration rejected: {}", error);
            return Err(error);
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let now = self.clock.now();
        let (user, refresh) = self
            .store
            .create_user(
                NewUser {
                    name: request.name,
                    email: request.email,
                    password_hash,
                    created_at: now,
                },
                self.tokens.issue_refresh_token(),
            )
            .await?;

        info!("Registered user {}", user.id);
        self.respond("User registered successfully", &user, &refresh)
    }

    /// Authenticates by email and password.
    ///
    /// An already active refresh token is handed out again (the earliest one); a new
    /// one is only issued when the user has none.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        if request.validate().is_err() {
            warn!("Login failed: missing email or password");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.into()));
        }

        let user = match self.store.find_user_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                warn!("Login failed: unknown email");
                return Err(AppError::Authentication(INVALID_CREDENTIALS.into()));
            }
        };
        if !self
            .hasher
            .verify(&request.password, &user.password_hash)
            .await?
        {
            warn!("Login failed for user {}: wrong password", user.id);
            return Err(AppError::Authentication(INVALID_CREDENTIALS.into()));
        }

        let now = self.clock.now();
        let refresh = match self.store.find_active_refresh_token(user.id, now).await? {
            Some(existing) => existing,
            None => {
                self.store
                    .insert_refresh_token(user.id, self.tokens.issue_refresh_token())
                    .await?
            }
        };

        info!("User {} logged in", user.id);
        self.respond("User logged in successfully", &user, &refresh)
    }

    /// Exchanges an active refresh token for a new access token and a new refresh
    /// token. The presented token is revoked.
    pub async fn refresh(&self, token: &str) -> Result<AuthResponse, AppError> {
        let now = self.clock.now();
        let current = match self.store.find_refresh_token(token).await? {
            Some(current) if current.is_active(now) => current,
            _ => {
                warn!("Refresh rejected: token unknown, expired or revoked");
                return Err(AppError::Authentication(INVALID_REFRESH_TOKEN.into()));
            }
        };

        let user = self
            .store
            .find_user_by_id(current.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found.".into()))?;

        let replacement = self
            .store
            .rotate_refresh_token(current.id, now, self.tokens.issue_refresh_token())
            .await?
            .ok_or_else(|| {
                warn!("Refresh token {} was rotated concurrently", current.id);
                AppError::Authentication(INVALID_REFRESH_TOKEN.into())
            })?;

        info!("Rotated refresh token for user {}", user.id);
        self.respond("Token refreshed successfully", &user, &replacement)
    }

    /// Revokes an active refresh token. Unknown, expired and already revoked tokens
    /// are all rejected the same way.
    pub async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let now = self.clock.now();
        let current = match self.store.find_refresh_token(token).await? {
            Some(current) if current.is_active(now) => current,
            _ => {
                warn!("Revoke rejected: token unknown, expired or revoked");
                return Err(AppError::Authentication(NOT_REVOCABLE.into()));
            }
        };

        if !self.store.revoke_refresh_token(current.id, now).await? {
            return Err(AppError::Authentication(NOT_REVOCABLE.into()));
        }
        info!("Revoked refresh token for user {}", current.user_id);
        Ok(true)
    }

    fn respond(
        &self,
        message: &str,
        user: &User,
        refresh: &RefreshToken,
    ) -> Result<AuthResponse, AppError> {
        let access = self.tokens.issue_access_token(user)?;
        Ok(AuthResponse {
            message: message.to_string(),
            is_authenticated: true,
            token: access.token,
            user_id: user.id,
            email: user.email.clone(),
            refresh_token: refresh.token.clone(),
            refresh_token_expires_on: refresh.expires_on,
        })
    }
}
