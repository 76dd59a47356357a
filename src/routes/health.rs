use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::config::AppEnvironment;

/// Liveness probe. Public, never touches storage.
///
/// Reports the service name and version, the deployment mode and the server time.
#[get("/health")]
pub async fn health(environment: web::Data<AppEnvironment>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": environment.as_str(),
        "timestamp": Utc::now()
    }))
}
