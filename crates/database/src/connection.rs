use crate::error::DbError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database at `database_url`.
///
/// The URL comes from configuration; the binary loads `.env` before configuration is
/// read, so `MERIDIAN__PERSISTENCE__DATABASE_URL` may live there.
pub async fn connect(database_url: &str) -> Result<PgPool, DbError> {
    if database_url.trim().is_empty() {
        return Err(DbError::ConnectionConfigError(
            "database_url must not be empty".to_string(),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded migrations so the `kv_store` table exists.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
