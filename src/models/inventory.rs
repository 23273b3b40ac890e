use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of trailing switch ports reserved for fiber transceivers
pub const FIBER_PORT_COUNT: i64 = 4;

/// Medium tag written on fiber panel ports cabled to a switch
pub const SWITCH_FIBER_MEDIUM: &str = "switch_fiber";

/// Switch as seen by the synchronizer (inventory owns the row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<i64>,
    // Enriched via JOIN (not stored)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_name: Option<String>,
    pub ports: i64,
}

impl Switch {
    /// The last [`FIBER_PORT_COUNT`] ports are fiber-capable, everything before is copper.
    pub fn is_fiber_port(&self, port_no: i64) -> bool {
        port_no > self.ports - FIBER_PORT_COUNT
    }
}

/// The two structurally parallel panel families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelFamily {
    Patch,
    Fiber,
}

impl PanelFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patch" => Some(PanelFamily::Patch),
            "fiber" => Some(PanelFamily::Fiber),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelFamily::Patch => "patch",
            PanelFamily::Fiber => "fiber",
        }
    }

    pub fn is_fiber(&self) -> bool {
        matches!(self, PanelFamily::Fiber)
    }

    pub fn port_table(&self) -> &'static str {
        match self {
            PanelFamily::Patch => "patch_ports",
            PanelFamily::Fiber => "fiber_ports",
        }
    }

    /// Endpoint type recorded in connection history
    pub fn endpoint_type(&self) -> &'static str {
        match self {
            PanelFamily::Patch => "patch_panel",
            PanelFamily::Fiber => "fiber_panel",
        }
    }

    /// Logical connection type recorded in connection history
    pub fn connection_type(&self) -> &'static str {
        match self {
            PanelFamily::Patch => "switch_to_patch",
            PanelFamily::Fiber => "switch_to_fiber",
        }
    }
}

impl std::fmt::Display for PanelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patch or fiber panel mounted in a rack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub id: i64,
    pub family: PanelFamily,
    pub rack_id: i64,
    pub panel_letter: String,
    /// total_ports for patch panels, total_fibers for fiber panels
    pub capacity: i64,
}

/// Canonical switch port link types
pub mod link_type {
    pub const EMPTY: &str = "EMPTY";
    pub const ETHERNET: &str = "ETHERNET";
    pub const FIBER: &str = "FIBER";
    pub const HUB: &str = "HUB";
    pub const DEVICE: &str = "DEVICE";

    /// Normalize a caller-supplied link type; blank means EMPTY.
    pub fn normalize(raw: &str) -> String {
        let t = raw.trim();
        if t.is_empty() {
            EMPTY.to_string()
        } else {
            t.to_uppercase()
        }
    }
}

/// Canonical panel port status values
pub mod panel_port_status {
    pub const ACTIVE: &str = "active";
    pub const INACTIVE: &str = "inactive";
}

/// Port is the switch-side record of one cable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: i64,
    pub switch_id: i64,
    pub port_no: i64,
    #[serde(rename = "type")]
    pub link_type: String,
    pub device: String,
    pub ip: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_panel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_panel_port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_to: Option<String>,
    pub connection_info: String,
    pub sync_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PanelPort is the panel-side record of one cable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelPort {
    pub id: i64,
    pub family: PanelFamily,
    pub panel_id: i64,
    pub port_number: i64,
    pub status: String, // active, inactive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_switch_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_switch_port: Option<i64>,
    /// Medium tag, fiber panels only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<serde_json::Value>,
    pub sync_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
