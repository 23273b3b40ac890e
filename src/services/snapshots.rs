use serde_json::{json, Value};

use crate::db::{PanelPortWrite, PortWrite};
use crate::models::PanelPort;

/// Audit snapshot of a switch port's synchronizer-owned fields
pub fn port(w: &PortWrite, version: i64) -> Value {
    json!({
        "type": w.link_type,
        "device": w.device,
        "ip": w.ip,
        "mac": w.mac,
        "connected_panel_id": w.connected_panel_id,
        "connected_panel_port": w.connected_panel_port,
        "connected_to": w.connected_to,
        "connection_info": w.connection_info,
        "sync_version": version,
    })
}

/// Audit snapshot of a stored panel port
pub fn stored_panel_port(pp: &PanelPort) -> Value {
    json!({
        "panel_id": pp.panel_id,
        "port_number": pp.port_number,
        "status": pp.status,
        "connected_to": pp.connected_to,
        "connected_switch_id": pp.connected_switch_id,
        "connected_switch_port": pp.connected_switch_port,
        "connection_type": pp.connection_type,
        "sync_version": pp.sync_version,
    })
}

/// Audit snapshot of a panel port as just written
pub fn panel_port(panel_id: i64, port_number: i64, w: &PanelPortWrite, version: i64) -> Value {
    json!({
        "panel_id": panel_id,
        "port_number": port_number,
        "status": w.status,
        "connected_to": w.connected_to,
        "connected_switch_id": w.connected_switch_id,
        "connected_switch_port": w.connected_switch_port,
        "connection_type": w.connection_type,
        "sync_version": version,
    })
}
