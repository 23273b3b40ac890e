use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a history entry records happening to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Deleted => "deleted",
        }
    }
}

/// Canonical endpoint type values
pub mod endpoint_type {
    pub const SWITCH: &str = "switch";
    pub const NONE: &str = "none";
}

/// Connection type recorded when no panel is involved
pub const CONNECTION_TYPE_NONE: &str = "none";

/// ConnectionHistory is one immutable audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHistory {
    pub id: i64,
    pub user_name: String,
    pub connection_type: String,
    pub source_type: String,
    pub source_id: i64,
    pub source_port: i64,
    pub target_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i64>,
    pub action: String,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit row about to be appended
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub user_name: String,
    pub connection_type: String,
    pub source_type: String,
    pub source_id: i64,
    pub source_port: i64,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub target_port: Option<i64>,
    pub action: HistoryAction,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
}

/// Filters for listing connection history, newest first
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub source_port: Option<i64>,
    #[serde(default)]
    pub limit: Option<i32>,
}

impl HistoryQuery {
    /// Clamp limit to [1, 1000], default 100
    pub fn limit(&self) -> i32 {
        self.limit.unwrap_or(100).clamp(1, 1000)
    }
}
