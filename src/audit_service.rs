use crate::audit_log;
use crate::crypto::FieldCipher;
use crate::error::ApiResult;
use crate::metrics::AUDIT_EVENTS_TOTAL;
use crate::models::{AuditActor, AuditEntry, AuditEntryWithActor, AuditRow, UserRow};
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

/// What happened to which entity. Renders to the stored action text.
#[derive(Debug, Clone, Copy)]
pub enum AuditAction {
    UserCreated(Uuid),
    UserUpdated(Uuid),
    UserDeleted(Uuid),
    PatientCreated(Uuid),
    PatientUpdated(Uuid),
    PatientDeleted(Uuid),
    ConsultationCreated(Uuid),
    ConsultationUpdated(Uuid),
    ConsultationDeleted(Uuid),
    ReportGenerated(Uuid),
    ReportDeleted(Uuid),
}

impl AuditAction {
    pub fn entity(&self) -> &'static str {
        match self {
            AuditAction::UserCreated(_) | AuditAction::UserUpdated(_) | AuditAction::UserDeleted(_) => "user",
            AuditAction::PatientCreated(_) | AuditAction::PatientUpdated(_) | AuditAction::PatientDeleted(_) => {
                "patient"
            }
            AuditAction::ConsultationCreated(_)
            | AuditAction::ConsultationUpdated(_)
            | AuditAction::ConsultationDeleted(_) => "consultation",
            AuditAction::ReportGenerated(_) | AuditAction::ReportDeleted(_) => "report",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AuditAction::UserCreated(id) => format!("User '{}' was created.", id),
            AuditAction::UserUpdated(id) => format!("User '{}' was updated.", id),
            AuditAction::UserDeleted(id) => format!("User '{}' was deleted.", id),
            AuditAction::PatientCreated(id) => format!("Patient '{}' was registered.", id),
            AuditAction::PatientUpdated(id) => format!("Patient '{}' was updated.", id),
            AuditAction::PatientDeleted(id) => format!("Patient '{}' was deleted.", id),
            AuditAction::ConsultationCreated(id) => format!("Consultation '{}' was registered.", id),
            AuditAction::ConsultationUpdated(id) => format!("Consultation '{}' was updated.", id),
            AuditAction::ConsultationDeleted(id) => format!("Consultation '{}' was deleted.", id),
            AuditAction::ReportGenerated(id) => format!("Report '{}' was generated.", id),
            AuditAction::ReportDeleted(id) => format!("Report '{}' was deleted.", id),
        }
    }
}

/// Append an audit row. Call inside the transaction of the mutation it describes.
pub async fn record(
    conn: &mut PgConnection,
    actor_id: Uuid,
    action: AuditAction,
) -> Result<AuditEntry, sqlx::Error> {
    let text = action.describe();

    let row: AuditRow = sqlx::query_as(
        "INSERT INTO audit_log (action, user_id) VALUES ($1, $2) RETURNING id, action, user_id, created_at"
    )
    .bind(&text)
    .bind(actor_id)
    .fetch_one(conn)
    .await?;

    AUDIT_EVENTS_TOTAL.with_label_values(&[action.entity()]).inc();
    audit_log!(action.entity(), text.as_str(), Some(actor_id), true);

    Ok(row.into())
}

/// Every audit row, newest first, with the acting user's identity.
pub async fn list(
    conn: &mut PgConnection,
    cipher: &FieldCipher,
) -> ApiResult<Vec<AuditEntryWithActor>> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        "SELECT id, action, user_id, created_at FROM audit_log ORDER BY created_at DESC"
    )
    .fetch_all(&mut *conn)
    .await?;

    let actor_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.user_id).collect();
    let actors: Vec<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(&actor_ids)
        .fetch_all(&mut *conn)
        .await?;

    let mut by_id = HashMap::new();
    for row in actors {
        let user = row.decrypt(cipher)?;
        by_id.insert(
            user.id,
            AuditActor {
                id: user.id,
                full_name: user.full_name,
                email: user.email,
            },
        );
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let actor = row.user_id.and_then(|id| by_id.get(&id).cloned());
            AuditEntryWithActor {
                entry: row.into(),
                actor,
            }
        })
        .collect())
}

/// Audit rows attributed to the given users, grouped per user.
pub async fn for_users(
    conn: &mut PgConnection,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<AuditEntry>>, sqlx::Error> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        "SELECT id, action, user_id, created_at FROM audit_log WHERE user_id = ANY($1) ORDER BY created_at"
    )
    .bind(user_ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<AuditEntry>> = HashMap::new();
    for row in rows {
        if let Some(user_id) = row.user_id {
            grouped.entry(user_id).or_default().push(row.into());
        }
    }
    Ok(grouped)
}
