use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    config::ResponseFormat,
    error::{AppError, AppResult},
    middleware::RequestId,
    services::providers::plex::validate_section,
    state::AppState,
};

/// Query string of the recommendation endpoint.
///
/// `limit` is kept as text so a non-numeric value falls back to the default
/// instead of being rejected.
#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<String>,
}

/// Missing, blank or non-numeric limits become 0, which the pipeline
/// replaces with its configured default
pub fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0)
}

/// Handler for `GET /recommendation/:movie_section`
pub async fn recommend(
    State(state): State<AppState>,
    Path(movie_section): Path<String>,
    Query(query): Query<RecommendationQuery>,
    request_id: Option<Extension<RequestId>>,
) -> AppResult<Response> {
    let request_id = request_id.map(|Extension(id)| id).unwrap_or_default();
    if let Err(e) = validate_section(&movie_section) {
        tracing::warn!(request_id = %request_id, error = %e, "Rejected library section");
        return Err(e);
    }
    let limit = parse_limit(query.limit.as_deref());

    tracing::info!(
        request_id = %request_id,
        section = %movie_section,
        limit = limit,
        "Recommendation requested"
    );

    // Dropping the pipeline future on timeout cancels its in-flight calls
    let outcome = tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.get_recommendation(&movie_section, limit),
    )
    .await
    .unwrap_or_else(|_| {
        Err(AppError::Timeout(format!(
            "recommendation for section {} took longer than {}s",
            movie_section,
            state.request_timeout.as_secs()
        )))
    });

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Recommendation failed");
            return Err(e);
        }
    };

    tracing::info!(
        request_id = %request_id,
        recommendations = result.videos.len(),
        "Recommendation served"
    );

    let body = match state.response_format {
        ResponseFormat::List => Json(result.videos).into_response(),
        ResponseFormat::Detailed => Json(result).into_response(),
    };
    Ok(body)
}
