use serde::{Deserialize, Deserializer, Serialize};

use super::{HistoryAction, PanelFamily};

/// Identifiers arrive from forms as numbers or numeric strings; anything
/// unparseable becomes 0 and is rejected by validation.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientInt {
    Int(i64),
    Text(String),
}

impl LenientInt {
    fn value(self) -> i64 {
        match self {
            LenientInt::Int(n) => n,
            LenientInt::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<LenientInt>::deserialize(d)?.map(LenientInt::value).unwrap_or(0))
}

fn lenient_opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<LenientInt>::deserialize(d)?.map(LenientInt::value))
}

/// SyncPortRequest describes the desired state of one switch port and,
/// optionally, the panel port it is cabled to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPortRequest {
    #[serde(default, deserialize_with = "lenient_int")]
    pub switch_id: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub port: i64,
    #[serde(default, deserialize_with = "lenient_opt_int")]
    pub panel_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_int")]
    pub panel_port: Option<i64>,
    #[serde(default)]
    pub panel_type: Option<String>,
    #[serde(default, rename = "type")]
    pub link_type: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub connection_info: Option<String>,
    #[serde(default)]
    pub actor: String,
}

/// Validated panel side of a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRef {
    pub family: PanelFamily,
    pub panel_id: i64,
    pub port_number: i64,
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub switch_id: i64,
    pub port: i64,
    pub port_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<PanelLink>,
    pub action: HistoryAction,
    pub history_id: i64,
}

/// The panel port a switch port ended up linked to
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelLink {
    pub panel_type: PanelFamily,
    pub panel_id: i64,
    pub panel_port: i64,
    pub version: i64,
}

/// DisconnectPanelPortRequest tears down the cable on one panel port
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectPanelPortRequest {
    #[serde(default)]
    pub panel_type: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub panel_id: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub port_number: i64,
    #[serde(default)]
    pub actor: String,
}

/// Result of a successful disconnect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOutcome {
    pub success: bool,
    pub panel_type: PanelFamily,
    pub panel_id: i64,
    pub port_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_switch_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_switch_port: Option<i64>,
    pub history_id: i64,
}
