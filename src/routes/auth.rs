use crate::{
    auth::{AuthResponse, AuthService, LoginRequest, RegisterRequest},
    error::AppError,
};
use actix_web::{
    cookie::{time::OffsetDateTime, Cookie, SameSite},
    get, post, put, web, HttpRequest, HttpResponse, HttpResponseBuilder,
};

/// Name of the HttpOnly cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "RefreshToken";

fn refresh_cookie(response: &AuthResponse) -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_TOKEN_COOKIE, response.refresh_token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish();
    if let Ok(expires) =
        OffsetDateTime::from_unix_timestamp(response.refresh_token_expires_on.timestamp())
    {
        cookie.set_expires(expires);
    }
    cookie
}

/// Writes the auth response body and moves its refresh token into the cookie.
fn with_refresh_cookie(mut builder: HttpResponseBuilder, response: AuthResponse) -> HttpResponse {
    builder.cookie(refresh_cookie(&response)).json(response)
}

fn refresh_token_from(req: &HttpRequest) -> Result<String, AppError> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Authentication("Refresh token is missing.".into()))
}

/// Register a new user
///
/// Creates the account and signs the user in.
///
/// ## Responses:
/// - `201 Created`: `AuthResponse` body; the refresh token is set as the `RefreshToken` cookie.
/// - `400 Bad Request`: One or more registration rules failed, or the email is taken.
#[post("/register")]
pub async fn register(
    auth: web::Data<AuthService>,
    register_data: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let response = auth.register(register_data.into_inner()).await?;
    Ok(with_refresh_cookie(HttpResponse::Created(), response))
}

/// Login user
///
/// ## Responses:
/// - `200 OK`: `AuthResponse` body and `RefreshToken` cookie.
/// - `401 Unauthorized`: Unknown email or wrong password.
#[post("/login")]
pub async fn login(
    auth: web::Data<AuthService>,
    login_data: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let response = auth.login(login_data.into_inner()).await?;
    Ok(with_refresh_cookie(HttpResponse::Ok(), response))
}

/// Exchange the refresh token cookie for a new access token and a rotated cookie.
///
/// ## Responses:
/// - `200 OK`: `AuthResponse` body and a new `RefreshToken` cookie.
/// - `401 Unauthorized`: The cookie is missing, or its token is unknown, expired or revoked.
#[get("/refresh-token")]
pub async fn refresh_token(
    auth: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let token = refresh_token_from(&req)?;
    let response = auth.refresh(&token).await?;
    Ok(with_refresh_cookie(HttpResponse::Ok(), response))
}

/// Revoke the refresh token held in the cookie.
///
/// ## Responses:
/// - `200 OK`: `true`.
/// - `401 Unauthorized`: The cookie is missing, or its token is not active.
#[put("/revoke-token")]
pub async fn revoke_token(
    auth: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let token = refresh_token_from(&req)?;
    let revoked = auth.revoke(&token).await?;
    Ok(HttpResponse::Ok().json(revoked))
}
