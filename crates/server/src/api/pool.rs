use axum::{extract::State, Json};
use std::sync::Arc;
use reelpress_core::PoolStatus;

use crate::state::AppState;

/// Worker pool status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<PoolStatus> {
    Json(state.pool().status().await)
}
