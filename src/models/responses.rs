use serde::{Deserialize, Serialize};
use crate::models::domain::{Notification, PendingRequest, AcceptedRequest, Request, ScoreResult};

/// Response for find matches endpoint
#[derive(Debug, Clone, Serialize)]
pub struct FindMatchesResponse {
    #[serde(rename = "recipientId")]
    pub recipient_id: i64,
    pub matches: Vec<ScoreResult>,
    pub total_results: usize,
}

/// Response for a newly created request
#[derive(Debug, Clone, Serialize)]
pub struct CreateRequestResponse {
    pub success: bool,
    pub request: Request,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequestsResponse {
    #[serde(rename = "donorId")]
    pub donor_id: i64,
    pub requests: Vec<PendingRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedRequestsResponse {
    #[serde(rename = "recipientId")]
    pub recipient_id: i64,
    pub requests: Vec<AcceptedRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationsResponse {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub notifications: Vec<Notification>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnounceResponse {
    pub success: bool,
    pub notified: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "scoringModel")]
    pub scoring_model: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
