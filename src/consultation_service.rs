use crate::crypto::FieldCipher;
use crate::database::{self, Table};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Consultation, ConsultationDetail, ConsultationRequest, ConsultationRow, Patient, PatientRow, User,
    UserRow, UserSummary,
};
use crate::patient_service;
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

/// Fields written on create and update. `kind` is the attending user's specialty.
#[derive(Debug, Clone)]
pub struct ConsultationInput<'a> {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub kind: &'a str,
    pub diagnosis: &'a str,
    pub prescriptions: Option<&'a str>,
}

impl<'a> ConsultationInput<'a> {
    pub fn from_request(req: &'a ConsultationRequest, attending: &'a User) -> Self {
        Self {
            patient_id: req.patient_id,
            user_id: attending.id,
            kind: attending.specialty.as_deref().unwrap_or_default(),
            diagnosis: &req.diagnosis,
            prescriptions: req.prescriptions.as_deref(),
        }
    }
}

pub async fn find(conn: &mut PgConnection, cipher: &FieldCipher, id: Uuid) -> ApiResult<Option<Consultation>> {
    let row: Option<ConsultationRow> =
        sqlx::query_as("SELECT * FROM consultations WHERE id = $1 AND deleted = false")
            .bind(id)
            .fetch_optional(conn)
            .await?;

    Ok(row.map(|r| r.decrypt(cipher)).transpose()?)
}

/// Related rows are loaded whatever their deleted flag, so history stays readable.
pub(crate) async fn patients_by_id(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, Patient>> {
    let rows: Vec<PatientRow> = sqlx::query_as("SELECT * FROM patients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(conn)
        .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        let patient = row.decrypt(cipher)?;
        out.insert(patient.id, patient);
    }
    Ok(out)
}

pub(crate) async fn users_by_id(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, User>> {
    let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(conn)
        .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        let user = row.decrypt(cipher)?;
        out.insert(user.id, user);
    }
    Ok(out)
}

/// Eager-load patient and attending user for each consultation.
pub(crate) async fn with_relations(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    consultations: Vec<Consultation>,
) -> ApiResult<Vec<ConsultationDetail>> {
    let patient_ids: Vec<Uuid> = consultations.iter().filter_map(|c| c.patient_id).collect();
    let user_ids: Vec<Uuid> = consultations.iter().filter_map(|c| c.user_id).collect();

    let patients = patients_by_id(&mut *conn, cipher, &patient_ids).await?;
    let users = users_by_id(conn, cipher, &user_ids).await?;

    Ok(consultations
        .into_iter()
        .map(|consultation| ConsultationDetail {
            patient: consultation.patient_id.and_then(|id| patients.get(&id).cloned()),
            physician: consultation
                .user_id
                .and_then(|id| users.get(&id))
                .map(UserSummary::from),
            consultation,
        })
        .collect())
}

pub async fn get(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    id: Uuid,
) -> ApiResult<Option<ConsultationDetail>> {
    let Some(consultation) = find(&mut *conn, cipher, id).await? else {
        return Ok(None);
    };
    let mut details = with_relations(conn, cipher, vec![consultation]).await?;

    Ok(details.pop())
}

pub async fn list(conn: &mut PgConnection, cipher: &FieldCipher) -> ApiResult<Vec<ConsultationDetail>> {
    let rows: Vec<ConsultationRow> =
        sqlx::query_as("SELECT * FROM consultations WHERE deleted = false ORDER BY created_at DESC")
            .fetch_all(&mut *conn)
            .await?;

    let consultations = rows
        .into_iter()
        .map(|r| r.decrypt(cipher))
        .collect::<Result<Vec<_>, _>>()?;

    with_relations(conn, cipher, consultations).await
}

async fn require_live_patient(conn: &mut PgConnection, cipher: &FieldCipher, patient_id: Uuid) -> ApiResult<()> {
    match patient_service::find(conn, cipher, patient_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound("Patient not found.".to_string())),
    }
}

pub async fn create(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    input: &ConsultationInput<'_>,
) -> ApiResult<Consultation> {
    require_live_patient(&mut *conn, cipher, input.patient_id).await?;

    let row: ConsultationRow = sqlx::query_as(
        "INSERT INTO consultations (diagnosis, prescriptions, kind, patient_id, user_id)
         VALUES ($1, $2, $3, $4, $5) RETURNING *"
    )
    .bind(cipher.encrypt(input.diagnosis)?)
    .bind(cipher.encrypt_opt(input.prescriptions)?)
    .bind(cipher.encrypt(input.kind)?)
    .bind(input.patient_id)
    .bind(input.user_id)
    .fetch_one(conn)
    .await?;

    Ok(row.decrypt(cipher)?)
}

pub async fn update(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    id: Uuid,
    input: &ConsultationInput<'_>,
) -> ApiResult<Option<Consultation>> {
    if find(&mut *conn, cipher, id).await?.is_none() {
        return Ok(None);
    }
    require_live_patient(&mut *conn, cipher, input.patient_id).await?;

    let row: Option<ConsultationRow> = sqlx::query_as(
        "UPDATE consultations
         SET diagnosis = $2, prescriptions = $3, kind = $4, patient_id = $5, user_id = $6, updated_at = now()
         WHERE id = $1 AND deleted = false
         RETURNING *"
    )
    .bind(id)
    .bind(cipher.encrypt(input.diagnosis)?)
    .bind(cipher.encrypt_opt(input.prescriptions)?)
    .bind(cipher.encrypt(input.kind)?)
    .bind(input.patient_id)
    .bind(input.user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| r.decrypt(cipher)).transpose()?)
}

pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> ApiResult<bool> {
    Ok(database::soft_delete(conn, Table::Consultations, id).await?)
}
