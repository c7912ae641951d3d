use super::{deleted, AppState};
use crate::audit_service::{self, AuditAction};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::CLINICAL_ROLES;
use crate::report_service;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

fn report_not_found() -> ApiError {
    ApiError::NotFound("Report not found.".to_string())
}

pub async fn list_reports(state: web::Data<AppState>, current: CurrentUser) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let reports = report_service::list(&mut conn, &state.cipher).await?;

    Ok(HttpResponse::Ok().json(reports))
}

pub async fn report_details(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let report = report_service::get(&mut conn, &state.cipher, path.into_inner())
        .await?
        .ok_or_else(report_not_found)?;

    Ok(HttpResponse::Ok().json(report))
}

pub async fn generate_report(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let report = report_service::generate(
        &state.pool,
        &state.cipher,
        state.generator.as_ref(),
        path.into_inner(),
        current.id(),
    )
    .await?;

    Ok(HttpResponse::Created().json(report))
}

pub async fn delete_report(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    if !report_service::soft_delete(&mut tx, id).await? {
        return Err(report_not_found());
    }
    audit_service::record(&mut tx, current.id(), AuditAction::ReportDeleted(id)).await?;
    tx.commit().await?;

    Ok(deleted())
}
