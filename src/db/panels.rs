use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::error::SyncError;
use crate::models::*;

use super::row_helpers::{insert_error, map_panel_port_row, map_panel_row};

fn select_panel(family: PanelFamily) -> &'static str {
    match family {
        PanelFamily::Patch => {
            "SELECT id, rack_id, panel_letter, total_ports AS capacity FROM patch_panels"
        }
        PanelFamily::Fiber => {
            "SELECT id, rack_id, panel_letter, total_fibers AS capacity FROM fiber_panels"
        }
    }
}

fn select_panel_port(family: PanelFamily) -> &'static str {
    match family {
        PanelFamily::Patch => {
            r#"
            SELECT id, panel_id, port_number, status, connected_to,
                   connected_switch_id, connected_switch_port, NULL AS connection_type,
                   connection_details, sync_version, created_at, updated_at
            FROM patch_ports
            "#
        }
        PanelFamily::Fiber => {
            r#"
            SELECT id, panel_id, port_number, status, connected_to,
                   connected_switch_id, connected_switch_port, connection_type,
                   connection_details, sync_version, created_at, updated_at
            FROM fiber_ports
            "#
        }
    }
}

/// Panel lookups. Panel rows belong to inventory.
pub struct PanelRepo;

impl PanelRepo {
    pub async fn find<'e, E>(ex: E, family: PanelFamily, id: i64) -> Result<Option<Panel>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(&format!("{} WHERE id = ? LIMIT 1", select_panel(family)))
            .bind(id)
            .fetch_optional(ex)
            .await?;

        Ok(row.as_ref().map(|r| map_panel_row(r, family)))
    }

    /// Read the panel for update (covered by the transaction's write lock)
    pub async fn lock(
        conn: &mut SqliteConnection,
        family: PanelFamily,
        id: i64,
    ) -> Result<Option<Panel>, SyncError> {
        Self::find(conn, family, id).await
    }
}

/// Panel-facing values written on a panel port
#[derive(Debug, Clone, PartialEq)]
pub struct PanelPortWrite {
    pub status: String,
    pub connected_to: Option<String>,
    pub connected_switch_id: Option<i64>,
    pub connected_switch_port: Option<i64>,
    /// Ignored for patch ports, which carry no medium tag
    pub connection_type: Option<String>,
    pub connection_details: Option<serde_json::Value>,
}

impl PanelPortWrite {
    /// Values of a panel port with no cable attached
    pub fn cleared() -> Self {
        Self {
            status: panel_port_status::INACTIVE.to_string(),
            connected_to: None,
            connected_switch_id: None,
            connected_switch_port: None,
            connection_type: None,
            connection_details: None,
        }
    }

    fn details_text(&self) -> Option<String> {
        self.connection_details.as_ref().map(|v| v.to_string())
    }
}

/// Patch and fiber port database operations
pub struct PanelPortRepo;

impl PanelPortRepo {
    pub async fn find<'e, E>(
        ex: E,
        family: PanelFamily,
        panel_id: i64,
        port_number: i64,
    ) -> Result<Option<PanelPort>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(&format!(
            "{} WHERE panel_id = ? AND port_number = ?",
            select_panel_port(family)
        ))
        .bind(panel_id)
        .bind(port_number)
        .fetch_optional(ex)
        .await?;

        Ok(row.as_ref().map(|r| map_panel_port_row(r, family)))
    }

    /// Read the row for update (covered by the transaction's write lock)
    pub async fn lock(
        conn: &mut SqliteConnection,
        family: PanelFamily,
        panel_id: i64,
        port_number: i64,
    ) -> Result<Option<PanelPort>, SyncError> {
        Self::find(conn, family, panel_id, port_number).await
    }

    pub async fn list_for_panel<'e, E>(
        ex: E,
        family: PanelFamily,
        panel_id: i64,
    ) -> Result<Vec<PanelPort>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(&format!(
            "{} WHERE panel_id = ? ORDER BY port_number",
            select_panel_port(family)
        ))
        .bind(panel_id)
        .fetch_all(ex)
        .await?;

        Ok(rows.iter().map(|r| map_panel_port_row(r, family)).collect())
    }

    /// Insert a new row at version 1
    pub async fn insert(
        conn: &mut SqliteConnection,
        family: PanelFamily,
        panel_id: i64,
        port_number: i64,
        w: &PanelPortWrite,
    ) -> Result<i64, SyncError> {
        let now = Utc::now();
        let query = match family {
            PanelFamily::Patch => sqlx::query(
                r#"
                INSERT INTO patch_ports (panel_id, port_number, status, connected_to,
                                         connected_switch_id, connected_switch_port,
                                         connection_details, sync_version, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(panel_id)
            .bind(port_number)
            .bind(&w.status)
            .bind(&w.connected_to)
            .bind(w.connected_switch_id)
            .bind(w.connected_switch_port)
            .bind(w.details_text())
            .bind(now)
            .bind(now),
            PanelFamily::Fiber => sqlx::query(
                r#"
                INSERT INTO fiber_ports (panel_id, port_number, status, connected_to,
                                         connected_switch_id, connected_switch_port, connection_type,
                                         connection_details, sync_version, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(panel_id)
            .bind(port_number)
            .bind(&w.status)
            .bind(&w.connected_to)
            .bind(w.connected_switch_id)
            .bind(w.connected_switch_port)
            .bind(&w.connection_type)
            .bind(w.details_text())
            .bind(now)
            .bind(now),
        };

        let result = query
            .execute(conn)
            .await
            .map_err(|e| insert_error(family.port_table(), e))?;
        Ok(result.last_insert_rowid())
    }

    /// Overwrite a row only if it is still at `expected_version`. Returns the
    /// new version; zero rows affected is a [`SyncError::Conflict`].
    pub async fn update_guarded(
        conn: &mut SqliteConnection,
        family: PanelFamily,
        id: i64,
        expected_version: i64,
        w: &PanelPortWrite,
    ) -> Result<i64, SyncError> {
        let new_version = expected_version + 1;
        let now = Utc::now();
        let query = match family {
            PanelFamily::Patch => sqlx::query(
                r#"
                UPDATE patch_ports SET
                    status = ?, connected_to = ?,
                    connected_switch_id = ?, connected_switch_port = ?,
                    connection_details = ?, sync_version = ?, updated_at = ?
                WHERE id = ? AND sync_version = ?
                "#,
            )
            .bind(&w.status)
            .bind(&w.connected_to)
            .bind(w.connected_switch_id)
            .bind(w.connected_switch_port)
            .bind(w.details_text())
            .bind(new_version)
            .bind(now)
            .bind(id)
            .bind(expected_version),
            PanelFamily::Fiber => sqlx::query(
                r#"
                UPDATE fiber_ports SET
                    status = ?, connected_to = ?,
                    connected_switch_id = ?, connected_switch_port = ?, connection_type = ?,
                    connection_details = ?, sync_version = ?, updated_at = ?
                WHERE id = ? AND sync_version = ?
                "#,
            )
            .bind(&w.status)
            .bind(&w.connected_to)
            .bind(w.connected_switch_id)
            .bind(w.connected_switch_port)
            .bind(&w.connection_type)
            .bind(w.details_text())
            .bind(new_version)
            .bind(now)
            .bind(id)
            .bind(expected_version),
        };

        let result = query.execute(conn).await?;
        if result.rows_affected() == 0 {
            return Err(SyncError::Conflict {
                table: family.port_table(),
                id,
                expected: expected_version,
            });
        }
        Ok(new_version)
    }
}
