use super::{deleted, AppState};
use crate::audit_service::{self, AuditAction};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateUserRequest, UpdateUserRequest, UserSearchQuery, ADMIN_ONLY, CLINICAL_ROLES};
use crate::user_service;
use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found.".to_string())
}

pub async fn list_users(state: web::Data<AppState>, current: CurrentUser) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;

    let mut conn = state.pool.acquire().await?;
    let users = user_service::list(&mut conn, &state.cipher).await?;

    Ok(HttpResponse::Ok().json(users))
}

pub async fn search_users(
    state: web::Data<AppState>,
    current: CurrentUser,
    query: web::Query<UserSearchQuery>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;

    let mut conn = state.pool.acquire().await?;
    let users = user_service::search(&mut conn, &state.cipher, &query.q).await?;

    Ok(HttpResponse::Ok().json(users))
}

pub async fn user_details(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(CLINICAL_ROLES)?;

    let mut conn = state.pool.acquire().await?;
    let user = user_service::get(&mut conn, &state.cipher, path.into_inner())
        .await?
        .ok_or_else(user_not_found)?;

    Ok(HttpResponse::Ok().json(user))
}

pub async fn create_user(
    state: web::Data<AppState>,
    current: CurrentUser,
    body: web::Json<CreateUserRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;
    body.validate()?;

    let mut tx = state.pool.begin().await?;
    let user = user_service::create(&mut tx, &state.cipher, &body).await?;
    audit_service::record(&mut tx, current.id(), AuditAction::UserCreated(user.id)).await?;
    tx.commit().await?;

    info!(user_id = %user.id, created_by = %current.id(), "User created");
    Ok(HttpResponse::Created().json(user))
}

pub async fn update_user(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateUserRequest>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;
    body.validate()?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    let user = user_service::update(&mut tx, &state.cipher, id, &body)
        .await?
        .ok_or_else(user_not_found)?;
    audit_service::record(&mut tx, current.id(), AuditAction::UserUpdated(id)).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    current: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    current.require_role(ADMIN_ONLY)?;
    let id = path.into_inner();

    let mut tx = state.pool.begin().await?;
    if !user_service::soft_delete(&mut tx, id).await? {
        return Err(user_not_found());
    }
    audit_service::record(&mut tx, current.id(), AuditAction::UserDeleted(id)).await?;
    tx.commit().await?;

    info!(user_id = %id, deleted_by = %current.id(), "User deleted");
    Ok(deleted())
}
