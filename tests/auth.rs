mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::Duration;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{context, init_app, refresh_cookie_of, register, with_refresh_cookie, PASSWORD};
use todo_api::config::AppEnvironment;

#[test_log::test(actix_rt::test)]
async fn test_register_login_refresh_revoke_flow() {
    let ctx = context(AppEnvironment::Production);
    let store = ctx.store.clone();
    let app = init_app(ctx.state).await;

    // Register Ann; the refresh token travels only in the cookie.
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": "Ann", "email": "ann@x.com", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "RefreshToken")
        .expect("refresh cookie");
    assert_eq!(cookie.http_only(), Some(true));
    let registered_refresh = cookie.value().to_string();
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["is_authenticated"], true);
    assert_eq!(body["email"], "ann@x.com");
    assert!(body.get("refresh_token").is_none());
    assert!(body["user_id"].as_i64().unwrap() > 0);

    // Wrong password.
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ann@x.com", "password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid email or password.");

    // Correct password hands back the still-active refresh token.
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ann@x.com", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(refresh_cookie_of(&resp), Some(registered_refresh.clone()));

    // Rotate.
    let req = with_refresh_cookie(test::TestRequest::get(), &registered_refresh)
        .uri("/api/auth/refresh-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated = refresh_cookie_of(&resp).expect("rotated cookie");
    assert_ne!(rotated, registered_refresh);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Token refreshed successfully");
    assert_eq!(store.refresh_tokens_for(body["user_id"].as_i64().unwrap() as i32).len(), 2);

    // The old token is dead.
    let req = with_refresh_cookie(test::TestRequest::get(), &registered_refresh)
        .uri("/api/auth/refresh-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid or expired refresh token.");

    // Revoke the new one, once.
    let req = with_refresh_cookie(test::TestRequest::put(), &rotated)
        .uri("/api/auth/revoke-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!(true));

    let req = with_refresh_cookie(test::TestRequest::put(), &rotated)
        .uri("/api/auth/revoke-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Token already revoked or not found.");
}

#[actix_rt::test]
async fn test_duplicate_registration_is_rejected() {
    let ctx = context(AppEnvironment::Production);
    let app = init_app(ctx.state).await;
    register(&app, "Ann", "ann@x.com").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": "Ann Again", "email": "ann@x.com", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["title"], "Bad Request");
    assert_eq!(body["detail"], "email: Email already exists.");
}

#[actix_rt::test]
async fn test_invalid_registration_inputs() {
    let ctx = context(AppEnvironment::Production);
    let app = init_app(ctx.state).await;

    let invalid_payloads = vec![
        json!({ "name": "", "email": "ann@x.com", "password": PASSWORD }),
        json!({ "name": "a".repeat(51), "email": "ann@x.com", "password": PASSWORD }),
        json!({ "name": "Ann", "email": "not-an-email", "password": PASSWORD }),
        json!({ "name": "Ann", "email": "ann@x.com", "password": "Sh0rt!" }),
        json!({ "name": "Ann", "email": "ann@x.com", "password": "n0upper!case" }),
        json!({ "name": "Ann", "email": "ann@x.com", "password": "NoDigits!Here" }),
        json!({ "name": "Ann", "email": "ann@x.com", "password": "N0Special1" }),
        json!({ "email": "ann@x.com", "password": PASSWORD }),
    ];

    for payload in invalid_payloads {
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            StatusCode::BAD_REQUEST,
            "payload {} should be rejected",
            payload
        );
    }
}

#[actix_rt::test]
async fn test_blank_login_is_unauthorized() {
    let ctx = context(AppEnvironment::Production);
    let app = init_app(ctx.state).await;
    register(&app, "Ann", "ann@x.com").await;

    for payload in [
        json!({ "email": "", "password": PASSWORD }),
        json!({ "email": "ann@x.com", "password": "" }),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "payload {}", payload);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Invalid email or password.");
    }
}

#[actix_rt::test]
async fn test_refresh_and_revoke_require_the_cookie() {
    let ctx = context(AppEnvironment::Production);
    let app = init_app(ctx.state).await;

    let req = test::TestRequest::get().uri("/api/auth/refresh-token").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Refresh token is missing.");

    let req = test::TestRequest::put().uri("/api/auth/revoke-token").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_expired_refresh_token_is_rejected_and_login_issues_a_new_one() {
    let ctx = context(AppEnvironment::Production);
    let clock = ctx.clock.clone();
    let app = init_app(ctx.state).await;
    let session = register(&app, "Ann", "ann@x.com").await;

    clock.advance(Duration::days(7));

    let req = with_refresh_cookie(test::TestRequest::get(), &session.refresh_token)
        .uri("/api/auth/refresh-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ann@x.com", "password": PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let fresh = refresh_cookie_of(&resp).expect("refresh cookie");
    assert_ne!(fresh, session.refresh_token);
}

#[actix_rt::test]
async fn test_unknown_route_uses_the_error_shape() {
    let ctx = context(AppEnvironment::Production);
    let app = init_app(ctx.state).await;

    let req = test::TestRequest::get().uri("/nowhere").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["title"], "Not Found");
}
