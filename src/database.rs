use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use uuid::Uuid;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
}

/// Tables that follow the soft-delete convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Users,
    Patients,
    Consultations,
    Reports,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Patients => "patients",
            Table::Consultations => "consultations",
            Table::Reports => "reports",
        }
    }
}

/// Flag a live row as deleted. `false` when there was no live row.
pub async fn soft_delete(conn: &mut PgConnection, table: Table, id: Uuid) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET deleted = true, updated_at = now() WHERE id = $1 AND deleted = false",
        table.name()
    );
    let result = sqlx::query(&sql).bind(id).execute(conn).await?;

    Ok(result.rows_affected() == 1)
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Users.name(), "users");
        assert_eq!(Table::Consultations.name(), "consultations");
    }

    #[test]
    fn test_non_database_error_is_not_unique_violation() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
