use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::error::SyncError;
use crate::models::*;

use super::row_helpers::{insert_error, map_port_row};

const SELECT_PORT: &str = r#"
    SELECT id, switch_id, port_no, type, device, ip, mac,
           connected_panel_id, connected_panel_port, connected_to,
           connection_info, sync_version, created_at, updated_at
    FROM ports
"#;

/// Full set of synchronizer-owned values for one ports row
#[derive(Debug, Clone, PartialEq)]
pub struct PortWrite {
    pub link_type: String,
    pub device: String,
    pub ip: String,
    pub mac: String,
    pub connected_panel_id: Option<i64>,
    pub connected_panel_port: Option<i64>,
    pub connected_to: Option<String>,
    pub connection_info: String,
}

impl PortWrite {
    /// Values a row already holds, as a starting point for partial changes
    pub fn from_port(port: &Port) -> Self {
        Self {
            link_type: port.link_type.clone(),
            device: port.device.clone(),
            ip: port.ip.clone(),
            mac: port.mac.clone(),
            connected_panel_id: port.connected_panel_id,
            connected_panel_port: port.connected_panel_port,
            connected_to: port.connected_to.clone(),
            connection_info: port.connection_info.clone(),
        }
    }
}

/// Switch port database operations
pub struct PortRepo;

impl PortRepo {
    pub async fn find<'e, E>(ex: E, switch_id: i64, port_no: i64) -> Result<Option<Port>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(&format!(
            "{} WHERE switch_id = ? AND port_no = ?",
            SELECT_PORT
        ))
        .bind(switch_id)
        .bind(port_no)
        .fetch_optional(ex)
        .await?;

        Ok(row.as_ref().map(map_port_row))
    }

    /// Read the row for update. SQLite has no row locks; the caller's
    /// `BEGIN IMMEDIATE` transaction already holds the write lock.
    pub async fn lock(
        conn: &mut SqliteConnection,
        switch_id: i64,
        port_no: i64,
    ) -> Result<Option<Port>, SyncError> {
        Self::find(conn, switch_id, port_no).await
    }

    pub async fn list_for_switch<'e, E>(ex: E, switch_id: i64) -> Result<Vec<Port>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(&format!(
            "{} WHERE switch_id = ? ORDER BY port_no",
            SELECT_PORT
        ))
        .bind(switch_id)
        .fetch_all(ex)
        .await?;

        Ok(rows.iter().map(map_port_row).collect())
    }

    /// Insert a new row at version 1
    pub async fn insert(
        conn: &mut SqliteConnection,
        switch_id: i64,
        port_no: i64,
        w: &PortWrite,
    ) -> Result<i64, SyncError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO ports (switch_id, port_no, type, device, ip, mac,
                               connected_panel_id, connected_panel_port, connected_to,
                               connection_info, sync_version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(switch_id)
        .bind(port_no)
        .bind(&w.link_type)
        .bind(&w.device)
        .bind(&w.ip)
        .bind(&w.mac)
        .bind(w.connected_panel_id)
        .bind(w.connected_panel_port)
        .bind(&w.connected_to)
        .bind(&w.connection_info)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .map_err(|e| insert_error("ports", e))?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite a row only if it is still at `expected_version`. Returns the
    /// new version; zero rows affected is a [`SyncError::Conflict`].
    pub async fn update_guarded(
        conn: &mut SqliteConnection,
        id: i64,
        expected_version: i64,
        w: &PortWrite,
    ) -> Result<i64, SyncError> {
        let new_version = expected_version + 1;
        let result = sqlx::query(
            r#"
            UPDATE ports SET
                type = ?, device = ?, ip = ?, mac = ?,
                connected_panel_id = ?, connected_panel_port = ?, connected_to = ?,
                connection_info = ?, sync_version = ?, updated_at = ?
            WHERE id = ? AND sync_version = ?
            "#,
        )
        .bind(&w.link_type)
        .bind(&w.device)
        .bind(&w.ip)
        .bind(&w.mac)
        .bind(w.connected_panel_id)
        .bind(w.connected_panel_port)
        .bind(&w.connected_to)
        .bind(&w.connection_info)
        .bind(new_version)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_version)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Conflict {
                table: "ports",
                id,
                expected: expected_version,
            });
        }
        Ok(new_version)
    }
}
