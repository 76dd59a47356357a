//! Shared application state and the route table, used by the binary and by tests.

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, TokenIssuer};
use crate::clock::{Clock, Entropy};
use crate::config::{AppEnvironment, JwtSettings};
use crate::error::AppError;
use crate::routes;
use crate::store::Store;
use crate::tasks::service::TaskService;

/// Everything the handlers pull out of `app_data`.
#[derive(Clone)]
pub struct AppState {
    auth: web::Data<AuthService>,
    tasks: web::Data<TaskService>,
    tokens: web::Data<TokenIssuer>,
    environment: web::Data<AppEnvironment>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
        jwt: JwtSettings,
        hasher: PasswordHasher,
        environment: AppEnvironment,
    ) -> Self {
        let tokens = TokenIssuer::new(jwt, clock.clone(), entropy);
        let auth = AuthService::new(store.clone(), hasher, tokens, clock.clone());
        let tasks = TaskService::new(store, clock);
        Self {
            // The middleware verifies with the same issuer the auth service signs with.
            tokens: web::Data::new(auth.tokens().clone()),
            auth: web::Data::new(auth),
            tasks: web::Data::new(tasks),
            environment: web::Data::new(environment),
        }
    }

    /// Registers state, body/query error mapping, `/health` and the `/api` routes.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.auth.clone())
            .app_data(self.tasks.clone())
            .app_data(self.tokens.clone())
            .app_data(self.environment.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::Validation(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::Validation(err.to_string()).into()
            }))
            .service(routes::health::health)
            .service(web::scope("/api").configure(routes::config));
    }
}

/// A router-level fallback so unknown paths answer in the same error shape.
pub async fn not_found() -> HttpResponse {
    AppError::NotFound("Resource not found.".into()).render(false)
}
