use super::{deleted, AppState};
use crate::audit_service::{self, AuditAction};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreatePatientRequest, UpdatePatientRequest, ADMIN_ONLY, CLINICAL_ROLES};
use crate::patient_service;
use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

fn patient_not_found() -> ApiError {
    ApiError::NotFound("Patient not found.".to_string())
}

pub async fn list_patients(state: web::Data<AppState>, current: CurrentUser) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let patients = patient_service::list(&mut conn, &state.cipher).await?;

    Ok(HttpResponse::Ok().json(patients))
}

pub async fn patient_details(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let patient = patient_service::get(&mut conn, &state.cipher, path.into_inner())
        .await?
        .ok_or_else(patient_not_found)?;

    Ok(HttpResponse::Ok().json(patient))
}

pub async fn create_patient(
    state: web::Data<AppState>,
    current: CurrentUser,
    body: web::Json<CreatePatientRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;
    body.validate()?;

    let mut tx = state.pool.begin().await?;
    let patient = patient_service::create(&mut tx, &state.cipher, &body).await?;
    audit_service::record(&mut tx, current.id(), AuditAction::PatientCreated(patient.id)).await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(patient))
}

pub async fn update_patient(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdatePatientRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;
    body.validate()?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    let patient = patient_service::update(&mut tx, &state.cipher, id, &body)
        .await?
        .ok_or_else(patient_not_found)?;
    audit_service::record(&mut tx, current.id(), AuditAction::PatientUpdated(id)).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(patient))
}

pub async fn delete_patient(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    if !patient_service::soft_delete(&mut tx, id).await? {
        return Err(patient_not_found());
    }
    audit_service::record(&mut tx, current.id(), AuditAction::PatientDeleted(id)).await?;
    tx.commit().await?;

    Ok(deleted())
}
