use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to open a donor/recipient request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRequestBody {
    #[validate(range(min = 1))]
    #[serde(alias = "donor_id", rename = "donorId")]
    pub donor_id: i64,
    #[validate(range(min = 1))]
    #[serde(alias = "recipient_id", rename = "recipientId")]
    pub recipient_id: i64,
}

/// Request to accept or decline a pending request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResolveRequestBody {
    #[validate(length(min = 1))]
    pub action: String,
}

/// Query string accepted by the find matches endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FindMatchesParams {
    #[serde(alias = "sort_by", rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(alias = "min_score", rename = "minScore")]
    pub min_score: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(alias = "max_distance", rename = "maxDistance")]
    pub max_distance: Option<f64>,
}

impl FindMatchesParams {
    /// Whether the caller asked for any filtering or sorting at all
    pub fn is_empty(&self) -> bool {
        self.sort_by.is_none() && self.min_score.is_none() && self.max_distance.is_none()
    }
}
