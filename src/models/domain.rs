use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Integer identity shared by every persisted record
pub type RecordId = i64;

/// Registered donor offering an organ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    pub id: RecordId,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "bloodType", default)]
    pub blood_type: Option<String>,
    pub organ: String,
    pub age: i32,
    pub latitude: f64,
    pub longitude: f64,
}

/// Registered recipient waiting for an organ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecordId,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "bloodType", default)]
    pub blood_type: Option<String>,
    #[serde(rename = "neededOrgan")]
    pub needed_organ: String,
    #[serde(rename = "urgencyLevel", default)]
    pub urgency_level: Option<i32>,
    pub age: i32,
    pub latitude: f64,
    pub longitude: f64,
}

/// Status of a donor/recipient request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }

    /// Accepted and declined requests never transition again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// Decision applied to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    /// Status the request ends up in when this decision applies
    pub fn target_status(&self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Decline => RequestStatus::Declined,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(Decision::Accept),
            "decline" => Ok(Decision::Decline),
            other => Err(format!("action must be 'accept' or 'decline', got '{}'", other)),
        }
    }
}

/// Proposed pairing between a donor and a recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RecordId,
    #[serde(rename = "donorId")]
    pub donor_id: RecordId,
    #[serde(rename = "recipientId")]
    pub recipient_id: RecordId,
    pub status: RequestStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Durable record of an accepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: RecordId,
    #[serde(rename = "donorId")]
    pub donor_id: RecordId,
    #[serde(rename = "recipientId")]
    pub recipient_id: RecordId,
    #[serde(rename = "donorName")]
    pub donor_name: String,
    #[serde(rename = "recipientName")]
    pub recipient_name: String,
    pub organ: String,
    #[serde(rename = "matchedAt")]
    pub matched_at: DateTime<Utc>,
}

/// Match row before the store assigns its identity
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub donor_id: RecordId,
    pub recipient_id: RecordId,
    pub donor_name: String,
    pub recipient_name: String,
    pub organ: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewDonor,
    RequestUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewDonor => "new_donor",
            NotificationKind::RequestUpdate => "request_update",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_donor" => Ok(NotificationKind::NewDonor),
            "request_update" => Ok(NotificationKind::RequestUpdate),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

/// Persisted notification for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RecordId,
    #[serde(rename = "userId")]
    pub user_id: RecordId,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: RecordId,
    pub message: String,
    pub kind: NotificationKind,
}

/// Scored candidate donor for a recipient
///
/// Values keep full precision; distance and compatibility are rounded to
/// two decimals only when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    #[serde(rename = "donorId")]
    pub donor_id: RecordId,
    #[serde(rename = "donorName")]
    pub donor_name: String,
    pub organ: String,
    #[serde(serialize_with = "serialize_rounded")]
    pub distance: f64,
    #[serde(rename = "urgencyScore")]
    pub urgency_score: i32,
    #[serde(rename = "compatibilityScore", serialize_with = "serialize_rounded")]
    pub compatibility_score: f64,
    #[serde(rename = "requestStatus")]
    pub request_status: Option<RequestStatus>,
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round2(*value))
}

/// Round to two decimal places for display
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pending request as listed for a donor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RecordId,
    pub status: RequestStatus,
    #[serde(rename = "recipientId")]
    pub recipient_id: RecordId,
    #[serde(rename = "recipientName")]
    pub recipient_name: String,
}

/// Accepted request as listed for a recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRequest {
    #[serde(rename = "requestId")]
    pub request_id: RecordId,
    #[serde(rename = "donorId")]
    pub donor_id: RecordId,
    #[serde(rename = "donorName")]
    pub donor_name: String,
    pub organ: String,
}

/// Outcome of resolving a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    #[serde(rename = "requestId")]
    pub request_id: RecordId,
    pub status: RequestStatus,
    /// True when the request was already terminal and nothing changed
    #[serde(rename = "alreadyResolved")]
    pub already_resolved: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_record: Option<Match>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub id: RecordId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub organ: String,
}

/// Recipient location together with every donor offering the needed organ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub recipient: MapPin,
    pub donors: Vec<MapPin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewDonor,
    NewRequest,
    RequestUpdate,
}

/// Real-time event published on a keyed channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub id: uuid::Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    #[serde(rename = "emittedAt")]
    pub emitted_at: DateTime<Utc>,
}

impl ChannelEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            payload,
            emitted_at: Utc::now(),
        }
    }
}

/// Payload announcing the outcome of a request to both parties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUpdate {
    pub status: RequestStatus,
    #[serde(rename = "donorName")]
    pub donor_name: String,
    #[serde(rename = "recipientName")]
    pub recipient_name: String,
    pub organ: String,
}
