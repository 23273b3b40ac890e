use axum::{extract::State, Json};
use std::sync::Arc;

use crate::auth::Actor;
use crate::models::*;
use crate::AppState;

use super::{ApiError, ApiJson};

/// Synchronize one switch port and its panel port
pub async fn sync_port(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(mut req): ApiJson<SyncPortRequest>,
) -> Result<Json<SyncOutcome>, ApiError> {
    req.actor = actor.or_body(&req.actor);
    let outcome = state.sync.sync_port(&req).await?;
    Ok(Json(outcome))
}

/// Disconnect a panel port from whatever switch port it is cabled to
pub async fn disconnect_panel_port(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ApiJson(mut req): ApiJson<DisconnectPanelPortRequest>,
) -> Result<Json<DisconnectOutcome>, ApiError> {
    req.actor = actor.or_body(&req.actor);
    let outcome = state.sync.disconnect_panel_port(&req).await?;
    Ok(Json(outcome))
}
