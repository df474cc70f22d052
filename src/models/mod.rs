// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    round2, AcceptedRequest, ChannelEvent, Decision, Donor, EventKind, MapPin, MapView, Match,
    NewMatch, NewNotification, Notification, NotificationKind, PendingRequest, Recipient,
    RecordId, Request, RequestStatus, RequestUpdate, Resolution, ScoreResult,
};
pub use requests::{CreateRequestBody, FindMatchesParams, ResolveRequestBody};
pub use responses::{
    AcceptedRequestsResponse, AnnounceResponse, CreateRequestResponse, ErrorResponse,
    FindMatchesResponse, HealthResponse, NotificationsResponse, PendingRequestsResponse,
};
