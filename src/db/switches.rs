use sqlx::{Executor, Sqlite};

use crate::error::SyncError;
use crate::models::*;

use super::row_helpers::map_switch_row;

const SELECT_SWITCH: &str = r#"
    SELECT s.id, s.name, s.rack_id, s.ports, r.name AS rack_name
    FROM switches s
    LEFT JOIN racks r ON r.id = s.rack_id
"#;

/// Switch lookups. Switch rows belong to inventory and are never written here.
pub struct SwitchRepo;

impl SwitchRepo {
    pub async fn find<'e, E>(ex: E, id: i64) -> Result<Option<Switch>, SyncError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(&format!("{} WHERE s.id = ? LIMIT 1", SELECT_SWITCH))
            .bind(id)
            .fetch_optional(ex)
            .await?;

        Ok(row.as_ref().map(map_switch_row))
    }
}
