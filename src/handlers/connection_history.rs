use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::ApiError;

/// List connection history, newest first
pub async fn list_connection_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ConnectionHistory>>, ApiError> {
    let rows = state.store.list_connection_history(&query).await?;
    Ok(Json(rows))
}
