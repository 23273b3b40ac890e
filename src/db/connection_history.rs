use chrono::Utc;
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection};

use crate::error::SyncError;
use crate::models::*;

use super::row_helpers::map_history_row;

/// Append-only audit log. The schema rejects UPDATE and DELETE with triggers.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append one entry on the caller's transaction connection, so the audit
    /// row commits or rolls back together with the change it describes.
    pub async fn append(conn: &mut SqliteConnection, entry: &NewHistoryEntry) -> Result<i64, SyncError> {
        let result = sqlx::query(
            r#"
            INSERT INTO connection_history (user_name, connection_type, source_type, source_id, source_port,
                                            target_type, target_id, target_port, action,
                                            old_values, new_values, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.user_name)
        .bind(&entry.connection_type)
        .bind(&entry.source_type)
        .bind(entry.source_id)
        .bind(entry.source_port)
        .bind(&entry.target_type)
        .bind(entry.target_id)
        .bind(entry.target_port)
        .bind(entry.action.as_str())
        .bind(entry.old_values.to_string())
        .bind(entry.new_values.to_string())
        .bind(Utc::now())
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// List entries newest first, optionally filtered by source endpoint
    pub async fn list<'e, E>(ex: E, q: &HistoryQuery) -> Result<Vec<ConnectionHistory>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, user_name, connection_type, source_type, source_id, source_port,
                   target_type, target_id, target_port, action, old_values, new_values, created_at
            FROM connection_history WHERE 1 = 1
            "#,
        );
        if let Some(source_type) = &q.source_type {
            qb.push(" AND source_type = ").push_bind(source_type.clone());
        }
        if let Some(source_id) = q.source_id {
            qb.push(" AND source_id = ").push_bind(source_id);
        }
        if let Some(source_port) = q.source_port {
            qb.push(" AND source_port = ").push_bind(source_port);
        }
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(q.limit());

        let rows = qb.build().fetch_all(ex).await?;
        Ok(rows.iter().map(map_history_row).collect())
    }
}
