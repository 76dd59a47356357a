//!
//! # Custom Error Handling
//!
//! This module defines the closed error taxonomy `AppError` used throughout the application.
//! Domain components raise the most specific variant; the HTTP boundary translates each
//! variant into a status code through a single table (`AppError::status_code`).
//!
//! `AppError` implements `actix_web::error::ResponseError`. Client-class errors carry their
//! own message to the caller, server-class errors are replaced by a generic message unless the
//! application runs in development mode (see `reveal_error_detail`).
//! `From` implementations for `sqlx::Error`, `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error` and `bcrypt::BcryptError` allow easy use of `?`.

use actix_web::{
    dev::ServiceResponse,
    http::StatusCode,
    middleware::ErrorHandlerResponse,
    web, HttpResponse, ResponseError,
};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

use crate::config::AppEnvironment;

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or missing input (HTTP 400).
    Validation(String),
    /// Bad credentials or a bad, expired or revoked token (HTTP 401).
    Authentication(String),
    /// A referenced user, task or token does not exist (HTTP 404).
    NotFound(String),
    /// The target is already in a terminal state (HTTP 409).
    Conflict(String),
    /// The persistence layer failed (HTTP 503).
    Storage(String),
    /// Functionality that is not available (HTTP 501).
    Unimplemented(String),
    /// An operation ran out of time (HTTP 408).
    Timeout(String),
    /// Any other unexpected server-side failure (HTTP 500).
    Internal(String),
}

impl AppError {
    /// The message carried by the variant, without its category prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(msg)
            | AppError::Authentication(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Storage(msg)
            | AppError::Unimplemented(msg)
            | AppError::Timeout(msg)
            | AppError::Internal(msg) => msg,
        }
    }

    /// Short human-readable title of the category.
    pub fn title(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Bad Request",
            AppError::Authentication(_) => "Unauthorized",
            AppError::NotFound(_) => "Not Found",
            AppError::Conflict(_) => "Conflict",
            AppError::Storage(_) => "Database Error",
            AppError::Unimplemented(_) => "Not Implemented",
            AppError::Timeout(_) => "Timeout",
            AppError::Internal(_) => "Internal Server Error",
        }
    }

    /// Generic caller-facing message used for server-class errors outside development mode.
    fn generic_detail(&self) -> &'static str {
        match self {
            AppError::Storage(_) => "Database error occurred.",
            AppError::Unimplemented(_) => "Functionality not implemented.",
            AppError::Timeout(_) => "The request timed out.",
            _ => "An unexpected error occurred. Please try again later.",
        }
    }

    /// Whether the caller may see this error's own message in production mode.
    fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Authentication(_)
                | AppError::NotFound(_)
                | AppError::Conflict(_)
        )
    }

    /// Renders the JSON problem body, optionally exposing the detailed message.
    pub fn render(&self, detailed: bool) -> HttpResponse {
        let detail = if detailed || self.is_client_error() {
            self.message()
        } else {
            self.generic_detail()
        };
        let status = self.status_code();
        HttpResponse::build(status).json(json!({
            "status": status.as_u16(),
            "title": self.title(),
            "detail": detail,
        }))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

impl std::error::Error for AppError {}

/// Converts `AppError` variants into `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_client_error() {
            log::warn!("Request rejected: {}", self);
        } else {
            log::error!("Request failed: {}", self);
        }
        self.render(false)
    }
}

/// Error handler that swaps the generic server-error body for the detailed one
/// when the application runs in development mode.
///
/// Registered through `actix_web::middleware::ErrorHandlers::default_handler_server`.
pub fn reveal_error_detail<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let development = res
        .request()
        .app_data::<web::Data<AppEnvironment>>()
        .map(|env| env.is_development())
        .unwrap_or(false);

    let detailed = if development {
        res.response()
            .error()
            .and_then(|err| err.as_error::<AppError>())
            .map(|err| err.render(true))
    } else {
        None
    };

    match detailed {
        Some(response) => {
            let (req, _) = res.into_parts();
            let res = ServiceResponse::new(req, response).map_into_right_body();
            Ok(ErrorHandlerResponse::Response(res))
        }
        None => Ok(ErrorHandlerResponse::Response(res.map_into_left_body())),
    }
}

/// Formats validator output as `field: message | field: message`, sorted by field name.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let msg = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, msg)
            })
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Converts `sqlx::Error` into `AppError::Storage`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        AppError::Storage(error.to_string())
    }
}

/// Converts `validator::ValidationErrors` into `AppError::Validation`.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::Validation(describe_validation_errors(&error))
    }
}

/// Converts `jsonwebtoken::errors::Error` into `AppError::Authentication`.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Authentication(format!("Invalid token: {}", error))
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::Internal`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::Internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_error_status_table() {
        let cases = vec![
            (AppError::Validation("bad".into()), 400),
            (AppError::Authentication("who".into()), 401),
            (AppError::NotFound("gone".into()), 404),
            (AppError::Conflict("again".into()), 409),
            (AppError::Storage("db down".into()), 503),
            (AppError::Unimplemented("later".into()), 501),
            (AppError::Timeout("slow".into()), 408),
            (AppError::Internal("boom".into()), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.error_response().status().as_u16(), status, "{}", error);
        }
    }

    #[actix_rt::test]
    async fn test_server_errors_hide_detail_in_production() {
        let response = AppError::Storage("connection refused on 10.0.0.3".into()).render(false);
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Database error occurred.");
        assert_eq!(json["status"], 503);
    }

    #[actix_rt::test]
    async fn test_client_errors_keep_detail() {
        let response = AppError::NotFound("Task not found.".into()).render(false);
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Task not found.");
        assert_eq!(json["title"], "Not Found");
    }

    #[actix_rt::test]
    async fn test_detailed_render_exposes_message() {
        let response = AppError::Internal("hash failure".into()).render(true);
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "hash failure");
    }
}
