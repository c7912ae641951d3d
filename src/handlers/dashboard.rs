use super::AppState;
use crate::audit_service;
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::flash;
use crate::models::{ADMIN_ONLY, CLINICAL_ROLES};
use actix_web::{web, HttpRequest, HttpResponse};

pub const ACCESS_DENIED_NOTICE: &str = "Access denied.";

/// Dashboard page model: the caller's profile and pending notices.
pub async fn dashboard(req: HttpRequest, current: CurrentUser) -> ApiResult<HttpResponse> {
    if !current.has_role(CLINICAL_ROLES) {
        return Err(ApiError::AccessDenied(current.with_notice(ACCESS_DENIED_NOTICE)));
    }

    let notifications = flash::take(&req);

    Ok(HttpResponse::Ok()
        .cookie(flash::removal())
        .json(serde_json::json!({
            "page": "dashboard",
            "user": current.user,
            "notifications": notifications
        })))
}

pub async fn audit_trail(state: web::Data<AppState>, current: CurrentUser) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;

    let mut conn = state.pool.acquire().await?;
    let entries = audit_service::list(&mut conn, &state.cipher).await?;

    Ok(HttpResponse::Ok().json(entries))
}

pub async fn clear_notifications(_current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(flash::removal())
        .json(serde_json::json!({"status": "cleared"}))
}
