use rocket_db_pools::sqlx::{self, Postgres, Transaction};
use std::time::Duration;

/// PostgreSQL session tuning for import transactions
pub struct PgConfig;

impl PgConfig {
    /// Bound every statement of the transaction by `timeout`
    pub async fn apply_statement_timeout(
        tx: &mut Transaction<'_, Postgres>,
        timeout: Duration,
    ) -> Result<(), sqlx::Error> {
        // SET does not accept bind parameters; the value is an integer we produced
        let statement = format!("SET LOCAL statement_timeout = {}", timeout.as_millis());
        sqlx::query(&statement).execute(&mut **tx).await?;

        let idle = format!(
            "SET LOCAL idle_in_transaction_session_timeout = {}",
            timeout.as_millis()
        );
        sqlx::query(&idle).execute(&mut **tx).await?;

        Ok(())
    }

    /// Apply bulk import optimizations at transaction level
    pub async fn apply_bulk_import_optimizations(
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(), sqlx::Error> {
        log::debug!("applying bulk import session settings");

        // Commit asynchronously; data is still durable via WAL
        sqlx::query("SET LOCAL synchronous_commit = 'off'")
            .execute(&mut **tx)
            .await?;

        sqlx::query("SET LOCAL work_mem = '64MB'")
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}
