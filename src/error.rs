use crate::crypto::CryptoError;
use crate::flash;
use crate::report_generator::GeneratorError;
use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const DASHBOARD_PATH: &str = "/core/dashboard";
pub const ACCESS_COOKIE: &str = "access_token";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,
    /// Carries every notice shown after the redirect, pending ones first.
    #[error("Restricted access")]
    Forbidden(Vec<String>),
    /// Authenticated, but the account's role may not use the system at all.
    #[error("Access denied")]
    AccessDenied(Vec<String>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Report generation failed: {0}")]
    Upstream(#[from] GeneratorError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Field decryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Redirect with `303 See Other`, optionally setting cookies.
pub fn see_other(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
    let mut builder = HttpResponse::SeeOther();
    builder.insert_header((header::LOCATION, location));
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder.finish()
}

pub fn access_cookie_removal() -> Cookie<'static> {
    let mut cookie = Cookie::build(ACCESS_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::Forbidden(_) | ApiError::AccessDenied(_) => {
                StatusCode::SEE_OTHER
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Unauthorized => see_other(LOGIN_PATH, vec![access_cookie_removal()]),
            ApiError::Forbidden(notices) => see_other(DASHBOARD_PATH, vec![flash::cookie(notices)]),
            ApiError::AccessDenied(notices) => see_other(LOGIN_PATH, vec![flash::cookie(notices)]),
            ApiError::NotFound(message) => HttpResponse::NotFound()
                .json(serde_json::json!({"status": "error", "message": message})),
            ApiError::Validation(message) => {
                HttpResponse::BadRequest().json(serde_json::json!({"error": message}))
            }
            ApiError::Conflict(message) => {
                HttpResponse::Conflict().json(serde_json::json!({"error": message}))
            }
            ApiError::Upstream(e) => {
                warn!(error = %e, "Report generator failed");
                HttpResponse::BadGateway()
                    .json(serde_json::json!({"error": "Report generation service unavailable"}))
            }
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal(_) => {
                error!(error = %self, "Request failed");
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "Internal server error"}))
            }
        }
    }
}
