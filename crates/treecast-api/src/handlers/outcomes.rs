//! /outcomes handler: results of earlier requests.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use treecast_services::Outcome;

use super::ApiState;

#[derive(Deserialize)]
pub struct OutcomesQuery {
    /// Skip this many of the oldest outcomes.
    #[serde(default)]
    pub since: usize,
}

#[derive(Serialize)]
pub struct OutcomesResponse {
    /// Total outcomes recorded so far; pass as `since` to poll for new ones.
    pub total: usize,
    pub outcomes: Vec<Outcome>,
}

pub async fn handle_outcomes(
    State(state): State<ApiState>,
    Query(query): Query<OutcomesQuery>,
) -> Json<OutcomesResponse> {
    let total = state.outcomes.count();
    let outcomes = state.outcomes.since(query.since);
    Json(OutcomesResponse { total, outcomes })
}
