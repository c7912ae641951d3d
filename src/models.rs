use crate::crypto::{CryptoError, FieldCipher};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============ Roles ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "administrator" => Ok(Role::Administrator),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Roles allowed on most clinical pages.
pub const CLINICAL_ROLES: &[Role] = &[Role::Administrator, Role::Staff];
pub const ADMIN_ONLY: &[Role] = &[Role::Administrator];

// ============ User Models ============

/// Row as stored: personal fields hold ciphertext.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: String,
    pub specialty: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: String,
    pub specialty: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `None` for roles this service does not recognise.
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

impl UserRow {
    pub fn decrypt(self, cipher: &FieldCipher) -> Result<User, CryptoError> {
        Ok(User {
            id: self.id,
            full_name: cipher.decrypt(&self.full_name)?,
            email: cipher.decrypt(&self.email)?,
            password_hash: self.password_hash,
            phone: cipher.decrypt_opt(self.phone.as_deref())?,
            role: self.role,
            specialty: cipher.decrypt_opt(self.specialty.as_deref())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithAudit {
    #[serde(flatten)]
    pub user: User,
    pub audit: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            specialty: user.specialty.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_new_user_passwords"))]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email, length(max = 200))]
    pub email: String,
    #[validate(length(max = 200))]
    pub phone: Option<String>,
    pub role: Role,
    #[validate(length(max = 100))]
    pub specialty: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub password: String,
    pub confirm_password: String,
}

fn validate_new_user_passwords(req: &CreateUserRequest) -> Result<(), ValidationError> {
    if req.password != req.confirm_password {
        return Err(ValidationError::new("passwords_do_not_match"));
    }
    Ok(())
}

/// Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_user_update_passwords"))]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(email, length(max = 200))]
    pub email: Option<String>,
    #[validate(length(max = 200))]
    pub phone: Option<String>,
    pub role: Option<Role>,
    #[validate(length(max = 100))]
    pub specialty: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

fn validate_user_update_passwords(req: &UpdateUserRequest) -> Result<(), ValidationError> {
    if let Some(password) = &req.password {
        if req.confirm_password.as_deref() != Some(password.as_str()) {
            return Err(ValidationError::new("passwords_do_not_match"));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub q: String,
}

/// Any string is accepted as the login; one that matches no account is an unknown user.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// ============ Patient Models ============

#[derive(Debug, Clone, FromRow)]
pub struct PatientRow {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub national_id: String,
    pub sex: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub national_id: String,
    pub sex: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientRow {
    pub fn decrypt(self, cipher: &FieldCipher) -> Result<Patient, CryptoError> {
        Ok(Patient {
            id: self.id,
            full_name: cipher.decrypt(&self.full_name)?,
            birth_date: self.birth_date,
            national_id: cipher.decrypt(&self.national_id)?,
            sex: cipher.decrypt(&self.sex)?,
            email: cipher.decrypt_opt(self.email.as_deref())?,
            phone: cipher.decrypt(&self.phone)?,
            address: cipher.decrypt(&self.address)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Patient {
    /// Completed years of age on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        age_in_years(self.birth_date, today)
    }
}

pub fn age_in_years(birth_date: NaiveDate, today: NaiveDate) -> u32 {
    if today < birth_date {
        return 0;
    }
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientWithConsultations {
    #[serde(flatten)]
    pub patient: Patient,
    pub consultations: Vec<ConsultationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub sex: String,
}

impl From<&Patient> for PatientSummary {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            full_name: patient.full_name.clone(),
            birth_date: patient.birth_date,
            sex: patient.sex.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    pub birth_date: NaiveDate,
    #[validate(length(min = 1, max = 20))]
    pub national_id: String,
    #[validate(length(min = 1, max = 20))]
    pub sex: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub address: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePatientRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 20))]
    pub national_id: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub sex: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
}

// ============ Consultation Models ============

#[derive(Debug, Clone, FromRow)]
pub struct ConsultationRow {
    pub id: Uuid,
    pub diagnosis: Option<String>,
    pub prescriptions: Option<String>,
    pub kind: String,
    pub patient_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Consultation {
    pub id: Uuid,
    pub diagnosis: Option<String>,
    pub prescriptions: Option<String>,
    pub kind: String,
    pub patient_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultationRow {
    pub fn decrypt(self, cipher: &FieldCipher) -> Result<Consultation, CryptoError> {
        Ok(Consultation {
            id: self.id,
            diagnosis: cipher.decrypt_opt(self.diagnosis.as_deref())?,
            prescriptions: cipher.decrypt_opt(self.prescriptions.as_deref())?,
            kind: cipher.decrypt(&self.kind)?,
            patient_id: self.patient_id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsultationSummary {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub diagnosis: Option<String>,
    pub prescriptions: Option<String>,
}

impl From<&Consultation> for ConsultationSummary {
    fn from(consultation: &Consultation) -> Self {
        Self {
            id: consultation.id,
            date: consultation.created_at,
            diagnosis: consultation.diagnosis.clone(),
            prescriptions: consultation.prescriptions.clone(),
        }
    }
}

/// Consultation with its patient and attending user loaded.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationDetail {
    #[serde(flatten)]
    pub consultation: Consultation,
    pub patient: Option<Patient>,
    pub physician: Option<UserSummary>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsultationRequest {
    pub patient_id: Uuid,
    #[validate(length(min = 1))]
    pub diagnosis: String,
    pub prescriptions: Option<String>,
}

// ============ Report Models ============

#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub content: String,
    pub consultation_id: Option<Uuid>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub content: String,
    pub consultation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportRow {
    pub fn decrypt(self, cipher: &FieldCipher) -> Result<Report, CryptoError> {
        Ok(Report {
            id: self.id,
            content: cipher.decrypt(&self.content)?,
            consultation_id: self.consultation_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConsultation {
    pub id: Uuid,
    pub kind: String,
    pub diagnosis: Option<String>,
    pub prescriptions: Option<String>,
    pub patient: Option<PatientSummary>,
    pub physician: Option<UserSummary>,
}

impl From<&ConsultationDetail> for ReportConsultation {
    fn from(detail: &ConsultationDetail) -> Self {
        Self {
            id: detail.consultation.id,
            kind: detail.consultation.kind.clone(),
            diagnosis: detail.consultation.diagnosis.clone(),
            prescriptions: detail.consultation.prescriptions.clone(),
            patient: detail.patient.as_ref().map(PatientSummary::from),
            physician: detail.physician.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub consultation: Option<ReportConsultation>,
}

// ============ Audit Models ============

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub action: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            action: row.action,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditActor {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryWithActor {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub actor: Option<AuditActor>,
}

// ============ JWT Claims ============

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // user email
    pub user_id: Uuid,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: Uuid,    // JWT ID (for revocation)
}
