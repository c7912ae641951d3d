use super::{deleted, AppState};
use crate::audit_service::{self, AuditAction};
use crate::auth::CurrentUser;
use crate::consultation_service::{self, ConsultationInput};
use crate::error::{ApiError, ApiResult};
use crate::models::{ConsultationRequest, ADMIN_ONLY, CLINICAL_ROLES};
use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

fn consultation_not_found() -> ApiError {
    ApiError::NotFound("Consultation not found.".to_string())
}

pub async fn list_consultations(state: web::Data<AppState>, current: CurrentUser) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let consultations = consultation_service::list(&mut conn, &state.cipher).await?;

    Ok(HttpResponse::Ok().json(consultations))
}

pub async fn consultation_details(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let consultation = consultation_service::get(&mut conn, &state.cipher, path.into_inner())
        .await?
        .ok_or_else(consultation_not_found)?;

    Ok(HttpResponse::Ok().json(consultation))
}

/// Recorded under the caller, with the caller's specialty as its kind.
pub async fn create_consultation(
    state: web::Data<AppState>,
    current: CurrentUser,
    body: web::Json<ConsultationRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;
    body.validate()?;
    let input = ConsultationInput::from_request(&body, &current.user);

    let mut tx = state.pool.begin().await?;
    let consultation = consultation_service::create(&mut tx, &state.cipher, &input).await?;
    audit_service::record(&mut tx, current.id(), AuditAction::ConsultationCreated(consultation.id)).await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(consultation))
}

pub async fn update_consultation(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<ConsultationRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;
    body.validate()?;
    let id = path.into_inner();
    let input = ConsultationInput::from_request(&body, &current.user);

    let mut tx = state.pool.begin().await?;
    let consultation = consultation_service::update(&mut tx, &state.cipher, id, &input)
        .await?
        .ok_or_else(consultation_not_found)?;
    audit_service::record(&mut tx, current.id(), AuditAction::ConsultationUpdated(id)).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(consultation))
}

pub async fn delete_consultation(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    if !consultation_service::soft_delete(&mut tx, id).await? {
        return Err(consultation_not_found());
    }
    audit_service::record(&mut tx, current.id(), AuditAction::ConsultationDeleted(id)).await?;
    tx.commit().await?;

    Ok(deleted())
}
