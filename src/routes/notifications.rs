use crate::core::EngineError;
use crate::models::{NotificationsResponse, RecordId};
use crate::routes::AppState;
use actix_web::{web, HttpResponse};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/notifications/{user_id}", web::get().to(list_notifications));
}

/// GET /api/v1/notifications/{user_id}, oldest first
async fn list_notifications(
    state: web::Data<AppState>,
    path: web::Path<RecordId>,
) -> Result<HttpResponse, EngineError> {
    let user_id = path.into_inner();
    let notifications = state.engine.dispatcher().notifications_for(user_id).await?;

    Ok(HttpResponse::Ok().json(NotificationsResponse {
        user_id,
        count: notifications.len(),
        notifications,
    }))
}
