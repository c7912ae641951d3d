use crate::auth::JwtAuth;
use crate::crypto::FieldCipher;
use crate::metrics::metrics_handler;
use crate::report_generator::ReportGenerator;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

pub mod auth;
pub mod consultations;
pub mod dashboard;
pub mod patients;
pub mod reports;
pub mod users;

pub struct AppState {
    pub pool: PgPool,
    pub jwt_auth: Arc<JwtAuth>,
    pub cipher: Arc<FieldCipher>,
    pub generator: Arc<dyn ReportGenerator>,
}

// ============ Health Check ============

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    if db_ok {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "timestamp": Utc::now().to_rfc3339()
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "database": "disconnected"
        }))
    }
}

/// Every route the service exposes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(auth::index))
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/auth")
                .route("/login", web::get().to(auth::login_page))
                .route("/login", web::post().to(auth::login))
                .route("/logout", web::get().to(auth::logout)),
        )
        .service(
            web::scope("/core")
                .route("/dashboard", web::get().to(dashboard::dashboard))
                .route("/audit", web::get().to(dashboard::audit_trail))
                .route("/clear-notifications", web::post().to(dashboard::clear_notifications)),
        )
        .service(
            web::scope("/users")
                .route("/all", web::get().to(users::list_users))
                .route("/search", web::get().to(users::search_users))
                .route("/details/{id}", web::get().to(users::user_details))
                .route("/create", web::post().to(users::create_user))
                .route("/edit/{id}", web::post().to(users::update_user))
                .route("/delete/{id}", web::delete().to(users::delete_user)),
        )
        .service(
            web::scope("/patients")
                .route("/all", web::get().to(patients::list_patients))
                .route("/details/{id}", web::get().to(patients::patient_details))
                .route("/create", web::post().to(patients::create_patient))
                .route("/edit/{id}", web::post().to(patients::update_patient))
                .route("/delete/{id}", web::delete().to(patients::delete_patient)),
        )
        .service(
            web::scope("/consultations")
                .route("/all", web::get().to(consultations::list_consultations))
                .route("/details/{id}", web::get().to(consultations::consultation_details))
                .route("/create", web::post().to(consultations::create_consultation))
                .route("/edit/{id}", web::post().to(consultations::update_consultation))
                .route("/delete/{id}", web::delete().to(consultations::delete_consultation)),
        )
        .service(
            web::scope("/reports")
                .route("/all", web::get().to(reports::list_reports))
                .route("/details/{id}", web::get().to(reports::report_details))
                .route("/generate/{consultation_id}", web::post().to(reports::generate_report))
                .route("/delete/{id}", web::delete().to(reports::delete_report)),
        );
}

/// `{"status":"ok"}` for a completed delete.
pub(crate) fn deleted() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}
