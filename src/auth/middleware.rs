use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::debug;

use crate::auth::token::TokenIssuer;
use crate::error::AppError;

/// Requires `Authorization: Bearer <access token>` on every request it wraps.
///
/// The token is checked with the `web::Data<TokenIssuer>` registered on the app. On
/// success the user id from the `sub` claim is stored in the request extensions, where
/// [`AuthenticatedUserId`](crate::auth::AuthenticatedUserId) picks it up.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

fn authenticate(req: &ServiceRequest) -> Result<i32, AppError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| AppError::Internal("Token issuer is not configured".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Authentication("Missing token".into()))?;

    issuer.verify_access_token(token)?.user_id()
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req) {
            Ok(user_id) => {
                req.extensions_mut().insert(user_id);
                Box::pin(self.service.call(req))
            }
            Err(app_err) => {
                debug!("Rejected {} {}: {}", req.method(), req.path(), app_err);
                Box::pin(async move { Err(app_err.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::test_settings;
    use crate::auth::AuthenticatedUserId;
    use crate::clock::{FixedClock, OsEntropy};
    use crate::models::User;
    use actix_web::{http::StatusCode, test, App, HttpResponse};
    use chrono::Utc;
    use std::sync::Arc;

    async fn whoami(user: AuthenticatedUserId) -> HttpResponse {
        HttpResponse::Ok().body(user.0.to_string())
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            test_settings(),
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(OsEntropy),
        )
    }

    fn user(id: i32) -> User {
        User {
            id,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[actix_rt::test]
    async fn test_valid_bearer_reaches_handler_with_user_id() {
        let issuer = issuer();
        let token = issuer.issue_access_token(&user(7)).unwrap().token;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(issuer))
                .service(web::scope("/api").wrap(AuthMiddleware).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(body, "7");
    }

    #[actix_rt::test]
    async fn test_missing_or_bad_bearer_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(issuer()))
                .service(web::scope("/api").wrap(AuthMiddleware).route("/me", web::get().to(whoami))),
        )
        .await;

        let missing = test::TestRequest::get().uri("/api/me").to_request();
        let err = test::try_call_service(&app, missing).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

        let garbage = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let err = test::try_call_service(&app, garbage).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }
}
