#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::middleware::ErrorHandlers;
use actix_web::{test, web, App};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use todo_api::app::{not_found, AppState};
use todo_api::auth::PasswordHasher;
use todo_api::clock::{FixedClock, OsEntropy};
use todo_api::config::{AppEnvironment, JwtSettings};
use todo_api::error::reveal_error_detail;
use todo_api::routes::auth::REFRESH_TOKEN_COOKIE;
use todo_api::store::MemoryStore;

pub const PASSWORD: &str = "Str0ng!Pass";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        signing_key: "integration-test-signing-key-0123456789".to_string(),
        issuer: "todo-api".to_string(),
        audience: "todo-api-users".to_string(),
        access_token_minutes: 60,
        refresh_token_days: 7,
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

pub fn context(environment: AppEnvironment) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let state = AppState::new(
        store.clone(),
        clock.clone(),
        Arc::new(OsEntropy),
        jwt_settings(),
        PasswordHasher::new(4),
        environment,
    );
    TestContext {
        state,
        store,
        clock,
    }
}

/// The application exactly as `main` assembles it, minus CORS and access logging.
pub async fn init_app(
    state: AppState,
) -> impl Service<
    actix_http::Request,
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .wrap(ErrorHandlers::new().default_handler_server(reveal_error_detail))
            .configure(|cfg| state.configure(cfg))
            .default_service(web::to(not_found)),
    )
    .await
}

pub struct Session {
    pub user_id: i32,
    pub token: String,
    pub refresh_token: String,
}

pub fn refresh_cookie_of<B>(resp: &ServiceResponse<B>) -> Option<String> {
    resp.response()
        .cookies()
        .find(|c| c.name() == REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
}

pub fn with_refresh_cookie(req: test::TestRequest, token: &str) -> test::TestRequest {
    req.cookie(Cookie::new(REFRESH_TOKEN_COOKIE, token.to_string()))
}

pub async fn register(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    name: &str,
    email: &str,
) -> Session {
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": name, "email": email, "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);
    let refresh_token = refresh_cookie_of(&resp).expect("register sets the refresh cookie");
    let body: Value = test::read_body_json(resp).await;
    Session {
        user_id: body["user_id"].as_i64().expect("user_id in body") as i32,
        token: body["token"].as_str().expect("token in body").to_string(),
        refresh_token,
    }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
