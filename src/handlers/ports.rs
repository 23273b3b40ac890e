use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::ApiError;

/// List the stored ports of a switch
pub async fn list_switch_ports(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Port>>, ApiError> {
    let ports = state.store.list_switch_ports(id).await?;
    Ok(Json(ports))
}

/// List the stored ports of a patch or fiber panel
pub async fn list_panel_ports(
    State(state): State<Arc<AppState>>,
    Path((panel_type, id)): Path<(String, i64)>,
) -> Result<Json<Vec<PanelPort>>, ApiError> {
    let family = PanelFamily::parse(&panel_type)
        .ok_or_else(|| ApiError::bad_request("Invalid panelType (expected patch or fiber)"))?;
    let ports = state.store.list_panel_ports(family, id).await?;
    Ok(Json(ports))
}
