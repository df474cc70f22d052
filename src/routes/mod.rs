// Route exports
pub mod matches;
pub mod notifications;
pub mod requests;

use crate::core::{Engine, EngineError};
use crate::models::ErrorResponse;
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use std::sync::Arc;
use validator::ValidationErrors;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(requests::configure)
            .configure(notifications::configure),
    );
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict { .. } => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::ScoringUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// Turn validator output into the engine's validation error
pub(crate) fn invalid(errors: ValidationErrors) -> EngineError {
    tracing::info!("Validation failed: field_errors={:?}", errors);
    EngineError::Validation(errors.to_string())
}
