use crate::audit_service::{self, AuditAction};
use crate::auth::hash_password;
use crate::config::BootstrapConfig;
use crate::crypto::FieldCipher;
use crate::database::{self, is_unique_violation, Table};
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateUserRequest, Role, UpdateUserRequest, User, UserRow, UserWithAudit};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

/// Emails are matched on ciphertext, so they are normalised before encryption.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn duplicate_email() -> ApiError {
    ApiError::Conflict("A user with this email already exists".to_string())
}

pub async fn get(conn: &mut PgConnection, cipher: &FieldCipher, id: Uuid) -> ApiResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1 AND deleted = false")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|r| r.decrypt(cipher)).transpose()?)
}

pub async fn get_by_email(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    email: &str,
) -> ApiResult<Option<User>> {
    let sealed = cipher.encrypt(&normalize_email(email))?;

    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1 AND deleted = false")
        .bind(sealed)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|r| r.decrypt(cipher)).transpose()?)
}

async fn all_live(conn: &mut PgConnection, cipher: &FieldCipher) -> ApiResult<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users WHERE deleted = false ORDER BY created_at")
        .fetch_all(conn)
        .await?;

    rows.into_iter()
        .map(|r| r.decrypt(cipher).map_err(ApiError::from))
        .collect()
}

/// Live users, each with the audit rows they are the actor of.
pub async fn list(conn: &mut PgConnection, cipher: &FieldCipher) -> ApiResult<Vec<UserWithAudit>> {
    let users = all_live(&mut *conn, cipher).await?;
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let mut audits = audit_service::for_users(&mut *conn, &ids).await?;

    Ok(users
        .into_iter()
        .map(|user| {
            let audit = audits.remove(&user.id).unwrap_or_default();
            UserWithAudit { user, audit }
        })
        .collect())
}

/// Case-insensitive match on the full name. Names are encrypted, so the
/// filter runs after decryption.
pub async fn search(conn: &mut PgConnection, cipher: &FieldCipher, query: &str) -> ApiResult<Vec<User>> {
    let needle = query.trim().to_lowercase();
    let users = all_live(conn, cipher).await?;

    Ok(users
        .into_iter()
        .filter(|u| u.full_name.to_lowercase().contains(&needle))
        .collect())
}

pub async fn create(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    req: &CreateUserRequest,
) -> ApiResult<User> {
    let password_hash = hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    let result = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (full_name, email, password_hash, phone, role, specialty)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *"
    )
    .bind(cipher.encrypt(req.full_name.trim())?)
    .bind(cipher.encrypt(&normalize_email(&req.email))?)
    .bind(&password_hash)
    .bind(cipher.encrypt_opt(req.phone.as_deref())?)
    .bind(req.role.as_str())
    .bind(cipher.encrypt_opt(req.specialty.as_deref())?)
    .fetch_one(conn)
    .await;

    match result {
        Ok(row) => Ok(row.decrypt(cipher)?),
        Err(e) if is_unique_violation(&e) => Err(duplicate_email()),
        Err(e) => Err(e.into()),
    }
}

/// Applies only the fields present in `changes`. `None` when no live user has `id`.
pub async fn update(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    id: Uuid,
    changes: &UpdateUserRequest,
) -> ApiResult<Option<User>> {
    let row: Option<UserRow> =
        sqlx::query_as("SELECT * FROM users WHERE id = $1 AND deleted = false FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut user = row.decrypt(cipher)?;

    if let Some(full_name) = &changes.full_name {
        user.full_name = full_name.trim().to_string();
    }
    if let Some(email) = &changes.email {
        user.email = normalize_email(email);
    }
    if let Some(phone) = &changes.phone {
        user.phone = Some(phone.clone());
    }
    if let Some(role) = changes.role {
        user.role = role.as_str().to_string();
    }
    if let Some(specialty) = &changes.specialty {
        user.specialty = Some(specialty.clone());
    }
    if let Some(password) = &changes.password {
        user.password_hash = hash_password(password).map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    let result = sqlx::query_as::<_, UserRow>(
        "UPDATE users
         SET full_name = $2, email = $3, password_hash = $4, phone = $5, role = $6, specialty = $7,
             updated_at = now()
         WHERE id = $1 AND deleted = false
         RETURNING *"
    )
    .bind(id)
    .bind(cipher.encrypt(&user.full_name)?)
    .bind(cipher.encrypt(&user.email)?)
    .bind(&user.password_hash)
    .bind(cipher.encrypt_opt(user.phone.as_deref())?)
    .bind(&user.role)
    .bind(cipher.encrypt_opt(user.specialty.as_deref())?)
    .fetch_optional(conn)
    .await;

    match result {
        Ok(row) => Ok(row.map(|r| r.decrypt(cipher)).transpose()?),
        Err(e) if is_unique_violation(&e) => Err(duplicate_email()),
        Err(e) => Err(e.into()),
    }
}

pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> ApiResult<bool> {
    Ok(database::soft_delete(conn, Table::Users, id).await?)
}

/// Create the configured administrator unless a live account with that email exists.
pub async fn ensure_admin(pool: &PgPool, cipher: &FieldCipher, bootstrap: &BootstrapConfig) -> ApiResult<()> {
    let mut tx = pool.begin().await?;

    if get_by_email(&mut tx, cipher, &bootstrap.admin_email).await?.is_some() {
        return Ok(());
    }

    let req = CreateUserRequest {
        full_name: bootstrap.admin_name.clone(),
        email: bootstrap.admin_email.clone(),
        phone: None,
        role: Role::Administrator,
        specialty: None,
        password: bootstrap.admin_password.clone(),
        confirm_password: bootstrap.admin_password.clone(),
    };
    let admin = match create(&mut tx, cipher, &req).await {
        Ok(admin) => admin,
        // Another instance created it first.
        Err(ApiError::Conflict(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    audit_service::record(&mut tx, admin.id, AuditAction::UserCreated(admin.id)).await?;
    tx.commit().await?;

    info!(user_id = %admin.id, "Bootstrap administrator created");
    Ok(())
}
