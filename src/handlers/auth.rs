use super::AppState;
use crate::auth::{token_from_request, verify_password};
use crate::error::{access_cookie_removal, see_other, ApiError, ApiResult, ACCESS_COOKIE, DASHBOARD_PATH, LOGIN_PATH};
use crate::flash;
use crate::metrics::AUTH_ATTEMPTS_TOTAL;
use crate::models::LoginRequest;
use crate::user_service;
use crate::audit_log;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};

fn access_cookie(token: &str, max_age_minutes: i64) -> Cookie<'static> {
    Cookie::build(ACCESS_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(max_age_minutes))
        .finish()
}

fn login_failed(req: &HttpRequest, notice: String) -> HttpResponse {
    see_other(LOGIN_PATH, vec![flash::push(req, notice)])
}

pub async fn index() -> HttpResponse {
    see_other(LOGIN_PATH, Vec::new())
}

/// Login page model: pending notices, consumed on read.
pub async fn login_page(req: HttpRequest) -> HttpResponse {
    let notifications = flash::take(&req);

    HttpResponse::Ok()
        .cookie(flash::removal())
        .json(serde_json::json!({
            "page": "login",
            "notifications": notifications
        }))
}

pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let mut conn = state.pool.acquire().await?;
    let user = user_service::get_by_email(&mut conn, &state.cipher, &body.email).await?;

    let Some(user) = user else {
        AUTH_ATTEMPTS_TOTAL.with_label_values(&["unknown_user"]).inc();
        audit_log!("authentication", "login", None::<uuid::Uuid>, false);
        return Ok(login_failed(&req, format!("User {} does not exist.", body.email.trim())));
    };

    if !verify_password(&body.password, &user.password_hash) {
        AUTH_ATTEMPTS_TOTAL.with_label_values(&["bad_password"]).inc();
        audit_log!("authentication", "login", Some(user.id), false);
        warn!(user_id = %user.id, "Login rejected: wrong password");
        return Ok(login_failed(
            &req,
            format!("The password does not match user {}.", body.email.trim()),
        ));
    }

    let token = state
        .jwt_auth
        .generate_token(user.id, &user.email, &user.role)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    AUTH_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
    audit_log!("authentication", "login", Some(user.id), true);
    info!(user_id = %user.id, "User logged in");

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, DASHBOARD_PATH))
        .cookie(access_cookie(&token, state.jwt_auth.expiration_minutes()))
        .finish())
}

/// Revokes the presented token, if it is still valid, and drops the cookie.
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    if let Some(token) = token_from_request(&req) {
        if let Ok(claims) = state.jwt_auth.validate_token(&token) {
            state.jwt_auth.revoke_token(&claims, &state.pool).await?;
            audit_log!("authentication", "logout", Some(claims.user_id), true);
        }
    }

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, LOGIN_PATH))
        .cookie(access_cookie_removal())
        .finish())
}
