use sqlx::{sqlite::SqliteRow, Row};

use crate::error::SyncError;
use crate::models::*;

/// Filter empty strings to None; legacy rows store '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Parse a JSON text column; unparseable legacy values are kept as plain strings
pub fn json_column(opt: Option<String>) -> Option<serde_json::Value> {
    let text = none_if_empty(opt)?;
    Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

/// A unique violation on a lazy insert means another writer created the row
/// first. That is a lost race, not a schema problem.
pub fn insert_error(table: &'static str, err: sqlx::Error) -> SyncError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return SyncError::Conflict {
                table,
                id: 0,
                expected: 0,
            };
        }
    }
    err.into()
}

/// Map a SQLite row (switch joined with rack) to a Switch struct
pub fn map_switch_row(row: &SqliteRow) -> Switch {
    Switch {
        id: row.get("id"),
        name: row.get("name"),
        rack_id: row.try_get::<Option<i64>, _>("rack_id").ok().flatten(),
        rack_name: none_if_empty(row.try_get("rack_name").unwrap_or_default()),
        ports: row.get("ports"),
    }
}

/// Map a SQLite row to a Panel struct
pub fn map_panel_row(row: &SqliteRow, family: PanelFamily) -> Panel {
    Panel {
        id: row.get("id"),
        family,
        rack_id: row.get("rack_id"),
        panel_letter: row.get("panel_letter"),
        capacity: row.get("capacity"),
    }
}

/// Map a SQLite row to a Port struct
pub fn map_port_row(row: &SqliteRow) -> Port {
    Port {
        id: row.get("id"),
        switch_id: row.get("switch_id"),
        port_no: row.get("port_no"),
        link_type: row.get("type"),
        device: row.get("device"),
        ip: row.get("ip"),
        mac: row.get("mac"),
        connected_panel_id: row.try_get::<Option<i64>, _>("connected_panel_id").ok().flatten(),
        connected_panel_port: row.try_get::<Option<i64>, _>("connected_panel_port").ok().flatten(),
        connected_to: none_if_empty(row.get("connected_to")),
        connection_info: row.get("connection_info"),
        sync_version: row.get("sync_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row from patch_ports or fiber_ports to a PanelPort struct
pub fn map_panel_port_row(row: &SqliteRow, family: PanelFamily) -> PanelPort {
    PanelPort {
        id: row.get("id"),
        family,
        panel_id: row.get("panel_id"),
        port_number: row.get("port_number"),
        status: row.get("status"),
        connected_to: none_if_empty(row.get("connected_to")),
        connected_switch_id: row.try_get::<Option<i64>, _>("connected_switch_id").ok().flatten(),
        connected_switch_port: row.try_get::<Option<i64>, _>("connected_switch_port").ok().flatten(),
        connection_type: none_if_empty(row.try_get("connection_type").unwrap_or_default()),
        connection_details: json_column(row.get("connection_details")),
        sync_version: row.get("sync_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a ConnectionHistory struct
pub fn map_history_row(row: &SqliteRow) -> ConnectionHistory {
    ConnectionHistory {
        id: row.get("id"),
        user_name: row.get("user_name"),
        connection_type: row.get("connection_type"),
        source_type: row.get("source_type"),
        source_id: row.get("source_id"),
        source_port: row.get("source_port"),
        target_type: row.get("target_type"),
        target_id: row.try_get::<Option<i64>, _>("target_id").ok().flatten(),
        target_port: row.try_get::<Option<i64>, _>("target_port").ok().flatten(),
        action: row.get("action"),
        old_values: json_column(row.get("old_values")).unwrap_or(serde_json::Value::Null),
        new_values: json_column(row.get("new_values")).unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_if_empty() {
        assert_eq!(none_if_empty(Some(String::new())), None);
        assert_eq!(none_if_empty(None), None);
        assert_eq!(none_if_empty(Some("R1-A3".into())), Some("R1-A3".into()));
    }

    #[test]
    fn test_json_column() {
        assert_eq!(json_column(None), None);
        assert_eq!(json_column(Some(String::new())), None);
        assert_eq!(
            json_column(Some(r#"{"switch_port": 22}"#.into())),
            Some(serde_json::json!({"switch_port": 22}))
        );
        assert_eq!(
            json_column(Some("legacy text".into())),
            Some(serde_json::Value::String("legacy text".into()))
        );
    }
}
