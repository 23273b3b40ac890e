mod connection_history;
mod panels;
mod ports;
pub(crate) mod row_helpers;
mod switches;
mod unit_of_work;

#[cfg(test)]
pub(crate) mod fixtures;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::models::*;

pub use connection_history::HistoryRepo;
pub use panels::{PanelPortRepo, PanelPortWrite, PanelRepo};
pub use ports::{PortRepo, PortWrite};
pub use switches::SwitchRepo;
pub use unit_of_work::{RetryPolicy, UnitOfWork};

/// Store owns the connection pool. It is built once by the composition root
/// and cloned into whatever needs database access.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    db_path: PathBuf,
}

impl Store {
    /// Create a new database store with a specific pool size and lock-wait timeout
    pub async fn with_options(
        db_path: impl AsRef<Path>,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", db_path.display()))?;

        let store = Self { pool, db_path };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Check out a dedicated connection for one unit of work
    pub async fn unit_of_work(&self) -> Result<UnitOfWork, SyncError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SyncError::Fatal(format!("could not acquire database connection: {}", e)))?;
        Ok(UnitOfWork::new(conn))
    }

    // ========== Read-only views ==========

    pub async fn ping(&self) -> Result<(), SyncError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_switch_ports(&self, switch_id: i64) -> Result<Vec<Port>, SyncError> {
        if SwitchRepo::find(&self.pool, switch_id).await?.is_none() {
            return Err(SyncError::validation(format!("Switch {} not found", switch_id)));
        }
        PortRepo::list_for_switch(&self.pool, switch_id).await
    }

    pub async fn list_panel_ports(
        &self,
        family: PanelFamily,
        panel_id: i64,
    ) -> Result<Vec<PanelPort>, SyncError> {
        if PanelRepo::find(&self.pool, family, panel_id).await?.is_none() {
            return Err(SyncError::validation(format!(
                "{} panel {} not found",
                family, panel_id
            )));
        }
        PanelPortRepo::list_for_panel(&self.pool, family, panel_id).await
    }

    pub async fn list_connection_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ConnectionHistory>, SyncError> {
        HistoryRepo::list(&self.pool, query).await
    }
}
