use crate::core::EngineError;
use crate::models::{
    AcceptedRequestsResponse, CreateRequestBody, CreateRequestResponse, Decision,
    PendingRequestsResponse, RecordId, ResolveRequestBody,
};
use crate::routes::{invalid, AppState};
use actix_web::{web, HttpResponse};
use validator::Validate;

/// Configure request lifecycle routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/requests", web::post().to(create_request))
        .route("/requests/{id}/resolve", web::post().to(resolve_request))
        .route("/donors/{id}/requests", web::get().to(pending_requests))
        .route("/recipients/{id}/accepted", web::get().to(accepted_requests));
}

/// Create request endpoint
///
/// POST /api/v1/requests
///
/// Request body:
/// ```json
/// {
///   "donorId": 1,
///   "recipientId": 2
/// }
/// ```
async fn create_request(
    state: web::Data<AppState>,
    body: web::Json<CreateRequestBody>,
) -> Result<HttpResponse, EngineError> {
    body.validate().map_err(invalid)?;

    let request = state
        .engine
        .lifecycle()
        .create_request(body.donor_id, body.recipient_id)
        .await?;

    Ok(HttpResponse::Created().json(CreateRequestResponse {
        success: true,
        request,
    }))
}

/// Resolve request endpoint
///
/// POST /api/v1/requests/{id}/resolve
///
/// Request body:
/// ```json
/// { "action": "accept" }
/// ```
async fn resolve_request(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
    body: web::Json<ResolveRequestBody>,
) -> Result<HttpResponse, EngineError> {
    body.validate().map_err(invalid)?;
    let decision: Decision = body.action.parse().map_err(EngineError::Validation)?;

    let resolution = state
        .engine
        .lifecycle()
        .resolve_request(path.into_inner(), decision)
        .await?;

    Ok(HttpResponse::Ok().json(resolution))
}

/// GET /api/v1/donors/{id}/requests
async fn pending_requests(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
) -> Result<HttpResponse, EngineError> {
    let donor_id = path.into_inner();
    let requests = state.engine.lifecycle().list_pending_requests(donor_id).await?;

    Ok(HttpResponse::Ok().json(PendingRequestsResponse { donor_id, requests }))
}

/// GET /api/v1/recipients/{id}/accepted
async fn accepted_requests(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
) -> Result<HttpResponse, EngineError> {
    let recipient_id = path.into_inner();
    let requests = state
        .engine
        .lifecycle()
        .list_accepted_requests(recipient_id)
        .await?;

    Ok(HttpResponse::Ok().json(AcceptedRequestsResponse {
        recipient_id,
        requests,
    }))
}
