use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::commands::{self, ProgressView, TopicsView};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::ScoreStats;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub range_days: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user}/progress", get(progress))
        .route("/{user}/stats", get(stats))
        .route("/{user}/topics", get(topics))
}

async fn progress(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<ProgressView>, AppError> {
    commands::get_progress(&state, &user).await.map(Json)
}

async fn stats(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ScoreStats>, AppError> {
    commands::get_stats(&state, &user, query.range_days)
        .await
        .map(Json)
}

async fn topics(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<TopicsView>, AppError> {
    commands::list_topics(&state, &user).await.map(Json)
}
