use crate::crypto::FieldCipher;
use crate::database::{self, is_unique_violation, Table};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Consultation, ConsultationRow, ConsultationSummary, CreatePatientRequest, Patient, PatientRow,
    PatientWithConsultations, UpdatePatientRequest,
};
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

fn duplicate_national_id() -> ApiError {
    ApiError::Conflict("A patient with this national id already exists".to_string())
}

/// Live patient by id, without relations.
pub async fn find(conn: &mut PgConnection, cipher: &FieldCipher, id: Uuid) -> ApiResult<Option<Patient>> {
    let row: Option<PatientRow> = sqlx::query_as("SELECT * FROM patients WHERE id = $1 AND deleted = false")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|r| r.decrypt(cipher)).transpose()?)
}

/// Live consultations for the given patients, grouped per patient.
async fn consultations_for(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    patient_ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<Consultation>>> {
    let rows: Vec<ConsultationRow> = sqlx::query_as(
        "SELECT * FROM consultations WHERE patient_id = ANY($1) AND deleted = false ORDER BY created_at"
    )
    .bind(patient_ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Consultation>> = HashMap::new();
    for row in rows {
        let consultation = row.decrypt(cipher)?;
        if let Some(patient_id) = consultation.patient_id {
            grouped.entry(patient_id).or_default().push(consultation);
        }
    }
    Ok(grouped)
}

fn attach(patient: Patient, consultations: Option<Vec<Consultation>>) -> PatientWithConsultations {
    PatientWithConsultations {
        patient,
        consultations: consultations
            .unwrap_or_default()
            .iter()
            .map(ConsultationSummary::from)
            .collect(),
    }
}

pub async fn get(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    id: Uuid,
) -> ApiResult<Option<PatientWithConsultations>> {
    let Some(patient) = find(&mut *conn, cipher, id).await? else {
        return Ok(None);
    };
    let mut consultations = consultations_for(conn, cipher, &[id]).await?;

    Ok(Some(attach(patient, consultations.remove(&id))))
}

pub async fn list(conn: &mut PgConnection, cipher: &FieldCipher) -> ApiResult<Vec<PatientWithConsultations>> {
    let rows: Vec<PatientRow> =
        sqlx::query_as("SELECT * FROM patients WHERE deleted = false ORDER BY created_at")
            .fetch_all(&mut *conn)
            .await?;

    let patients = rows
        .into_iter()
        .map(|r| r.decrypt(cipher))
        .collect::<Result<Vec<_>, _>>()?;
    let ids: Vec<Uuid> = patients.iter().map(|p| p.id).collect();
    let mut consultations = consultations_for(conn, cipher, &ids).await?;

    Ok(patients
        .into_iter()
        .map(|p| {
            let own = consultations.remove(&p.id);
            attach(p, own)
        })
        .collect())
}

pub async fn create(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    req: &CreatePatientRequest,
) -> ApiResult<Patient> {
    let result = sqlx::query_as::<_, PatientRow>(
        "INSERT INTO patients (full_name, birth_date, national_id, sex, email, phone, address)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *"
    )
    .bind(cipher.encrypt(req.full_name.trim())?)
    .bind(req.birth_date)
    .bind(cipher.encrypt(req.national_id.trim())?)
    .bind(cipher.encrypt(&req.sex)?)
    .bind(cipher.encrypt_opt(req.email.as_deref())?)
    .bind(cipher.encrypt(&req.phone)?)
    .bind(cipher.encrypt(&req.address)?)
    .fetch_one(conn)
    .await;

    match result {
        Ok(row) => Ok(row.decrypt(cipher)?),
        Err(e) if is_unique_violation(&e) => Err(duplicate_national_id()),
        Err(e) => Err(e.into()),
    }
}

pub async fn update(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    id: Uuid,
    changes: &UpdatePatientRequest,
) -> ApiResult<Option<Patient>> {
    let row: Option<PatientRow> =
        sqlx::query_as("SELECT * FROM patients WHERE id = $1 AND deleted = false FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut patient = row.decrypt(cipher)?;

    if let Some(full_name) = &changes.full_name {
        patient.full_name = full_name.trim().to_string();
    }
    if let Some(birth_date) = changes.birth_date {
        patient.birth_date = birth_date;
    }
    if let Some(national_id) = &changes.national_id {
        patient.national_id = national_id.trim().to_string();
    }
    if let Some(sex) = &changes.sex {
        patient.sex = sex.clone();
    }
    if let Some(email) = &changes.email {
        patient.email = Some(email.clone());
    }
    if let Some(phone) = &changes.phone {
        patient.phone = phone.clone();
    }
    if let Some(address) = &changes.address {
        patient.address = address.clone();
    }

    let result = sqlx::query_as::<_, PatientRow>(
        "UPDATE patients
         SET full_name = $2, birth_date = $3, national_id = $4, sex = $5, email = $6, phone = $7,
             address = $8, updated_at = now()
         WHERE id = $1 AND deleted = false
         RETURNING *"
    )
    .bind(id)
    .bind(cipher.encrypt(&patient.full_name)?)
    .bind(patient.birth_date)
    .bind(cipher.encrypt(&patient.national_id)?)
    .bind(cipher.encrypt(&patient.sex)?)
    .bind(cipher.encrypt_opt(patient.email.as_deref())?)
    .bind(cipher.encrypt(&patient.phone)?)
    .bind(cipher.encrypt(&patient.address)?)
    .fetch_optional(conn)
    .await;

    match result {
        Ok(row) => Ok(row.map(|r| r.decrypt(cipher)).transpose()?),
        Err(e) if is_unique_violation(&e) => Err(duplicate_national_id()),
        Err(e) => Err(e.into()),
    }
}

pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> ApiResult<bool> {
    Ok(database::soft_delete(conn, Table::Patients, id).await?)
}
