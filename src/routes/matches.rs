use crate::core::{EngineError, MatchQuery};
use crate::models::{AnnounceResponse, FindMatchesParams, FindMatchesResponse, HealthResponse, RecordId};
use crate::routes::{invalid, AppState};
use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

/// Configure health, matching and announcement routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/recipients/{id}/matches", web::get().to(find_matches))
        .route("/recipients/{id}/map", web::get().to(map_view))
        .route("/donors/{id}/announce", web::post().to(announce_donor));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state
        .engine
        .gateway()
        .health_check()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Store health check failed: {}", e);
            false
        });

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scoring_model: state.engine.finder().scorer().model_name().to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find matches endpoint
///
/// GET /api/v1/recipients/{id}/matches?sortBy=distance&minScore=0.5&maxDistance=250
///
/// Without query parameters every scored donor is returned, best first.
async fn find_matches(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
    params: web::Query<FindMatchesParams>,
) -> Result<HttpResponse, EngineError> {
    let recipient_id = path.into_inner();
    params.validate().map_err(invalid)?;

    let query = if params.is_empty() {
        None
    } else {
        Some(MatchQuery::try_from(&*params)?)
    };

    tracing::info!("Finding matches for recipient {} ({:?})", recipient_id, query);

    let matches = state
        .engine
        .finder()
        .find_matches(recipient_id, query.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(FindMatchesResponse {
        recipient_id,
        total_results: matches.len(),
        matches,
    }))
}

/// GET /api/v1/recipients/{id}/map
async fn map_view(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
) -> Result<HttpResponse, EngineError> {
    let view = state.engine.finder().map_view(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Announce a stored donor to every recipient needing their organ
///
/// POST /api/v1/donors/{id}/announce
async fn announce_donor(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
) -> Result<HttpResponse, EngineError> {
    let notified = state.engine.announce_donor(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AnnounceResponse {
        success: true,
        notified,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            scoring_model: "linear".to_string(),
            timestamp: chrono::Utc::now(),
        };

        assert_eq!(response.status, "healthy");
    }
}
