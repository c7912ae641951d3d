use crate::audit_service::{self, AuditAction};
use crate::consultation_service;
use crate::crypto::FieldCipher;
use crate::database::{self, Table};
use crate::error::{ApiError, ApiResult};
use crate::metrics::{REPORTS_GENERATED_TOTAL, REPORT_GENERATION_DURATION};
use crate::models::{ConsultationDetail, ConsultationRow, Report, ReportConsultation, ReportDetail, ReportRow};
use crate::report_generator::{GeneratorError, ReportGenerator, ReportRequest};
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Consultations by id, deleted or not, with patient and physician loaded.
async fn consultations_by_id(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    ids: &[Uuid],
) -> ApiResult<HashMap<Uuid, ConsultationDetail>> {
    let rows: Vec<ConsultationRow> = sqlx::query_as("SELECT * FROM consultations WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    let consultations = rows
        .into_iter()
        .map(|r| r.decrypt(cipher))
        .collect::<Result<Vec<_>, _>>()?;
    let details = consultation_service::with_relations(conn, cipher, consultations).await?;

    Ok(details.into_iter().map(|d| (d.consultation.id, d)).collect())
}

async fn with_consultations(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
    reports: Vec<Report>,
) -> ApiResult<Vec<ReportDetail>> {
    let ids: Vec<Uuid> = reports.iter().filter_map(|r| r.consultation_id).collect();
    let consultations = consultations_by_id(conn, cipher, &ids).await?;

    Ok(reports
        .into_iter()
        .map(|report| ReportDetail {
            consultation: report
                .consultation_id
                .and_then(|id| consultations.get(&id))
                .map(ReportConsultation::from),
            report,
        })
        .collect())
}

pub async fn get(conn: &mut PgConnection, cipher: &FieldCipher, id: Uuid) -> ApiResult<Option<ReportDetail>> {
    let row: Option<ReportRow> = sqlx::query_as("SELECT * FROM reports WHERE id = $1 AND deleted = false")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut details = with_consultations(conn, cipher, vec![row.decrypt(cipher)?]).await?;

    Ok(details.pop())
}

pub async fn list(conn: &mut PgConnection, cipher: &FieldCipher) -> ApiResult<Vec<ReportDetail>> {
    let rows: Vec<ReportRow> =
        sqlx::query_as("SELECT * FROM reports WHERE deleted = false ORDER BY created_at DESC")
            .fetch_all(&mut *conn)
            .await?;

    let reports = rows
        .into_iter()
        .map(|r| r.decrypt(cipher))
        .collect::<Result<Vec<_>, _>>()?;

    with_consultations(conn, cipher, reports).await
}

/// Prompt fields for a consultation. Fails with `NotFound` when the patient
/// or the attending physician cannot be resolved.
pub fn build_request(detail: &ConsultationDetail) -> ApiResult<ReportRequest> {
    let patient = detail
        .patient
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Patient not found.".to_string()))?;
    let physician = detail
        .physician
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Physician not found.".to_string()))?;

    Ok(ReportRequest {
        specialty: detail.consultation.kind.clone(),
        patient_name: patient.full_name.clone(),
        patient_sex: patient.sex.clone(),
        patient_age: patient.age_on(Utc::now().date_naive()),
        diagnosis: detail.consultation.diagnosis.clone().unwrap_or_default(),
        prescriptions: detail.consultation.prescriptions.clone().unwrap_or_default(),
        physician_name: physician.full_name.clone(),
    })
}

/// One generator call, timed and counted whatever its outcome.
async fn run_generator(
    generator: &dyn ReportGenerator,
    request: &ReportRequest,
    consultation_id: Uuid,
) -> Result<String, GeneratorError> {
    let start = Instant::now();
    let result = generator.generate(request).await;
    REPORT_GENERATION_DURATION.observe(start.elapsed().as_secs_f64());

    match &result {
        Ok(_) => REPORTS_GENERATED_TOTAL.with_label_values(&["success"]).inc(),
        Err(e) => {
            REPORTS_GENERATED_TOTAL.with_label_values(&["failure"]).inc();
            warn!(
                consultation_id = %consultation_id,
                provider = generator.provider_name(),
                error = %e,
                "Report generation failed"
            );
        }
    }

    result
}

/// Generate, store and audit a report for a live consultation.
///
/// The generator call happens outside any transaction; only the insert and
/// its audit row share one.
pub async fn generate(
    pool: &PgPool,
    cipher: &FieldCipher,
    generator: &dyn ReportGenerator,
    consultation_id: Uuid,
    actor_id: Uuid,
) -> ApiResult<ReportDetail> {
    let detail = {
        let mut conn = pool.acquire().await?;
        consultation_service::get(&mut conn, cipher, consultation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Consultation not found.".to_string()))?
    };
    let request = build_request(&detail)?;

    let content = run_generator(generator, &request, consultation_id).await?;

    let mut tx = pool.begin().await?;
    let row: ReportRow = sqlx::query_as(
        "INSERT INTO reports (content, consultation_id) VALUES ($1, $2) RETURNING *"
    )
    .bind(cipher.encrypt(&content)?)
    .bind(consultation_id)
    .fetch_one(&mut *tx)
    .await?;
    let report = row.decrypt(cipher)?;
    audit_service::record(&mut tx, actor_id, AuditAction::ReportGenerated(report.id)).await?;
    tx.commit().await?;

    info!(report_id = %report.id, consultation_id = %consultation_id, "Report generated");

    Ok(ReportDetail {
        report,
        consultation: Some(ReportConsultation::from(&detail)),
    })
}

pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> ApiResult<bool> {
    Ok(database::soft_delete(conn, Table::Reports, id).await?)
}
