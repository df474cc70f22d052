//! Persistence contract for donors, recipients, requests, matches and
//! notifications.
//!
//! Reads that need no isolation go through [`Gateway`] directly. Anything
//! that mutates requests or matches runs inside a [`UnitOfWork`] obtained
//! from [`Gateway::begin`]: the unit either commits every write or none.
//! Dropping a unit without calling `commit` rolls it back.

use crate::models::{
    AcceptedRequest, Donor, Match, NewMatch, NewNotification, Notification, PendingRequest,
    Recipient, RecordId, Request, RequestStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Missing record: {0}")]
    Missing(String),

    #[error("Unit of work aborted: {0}")]
    Aborted(String),

    #[error("Injected failure at {0}")]
    Injected(&'static str),
}

/// One atomic unit of reads and writes
#[async_trait]
pub trait UnitOfWork: Send {
    /// Serialize with every other unit touching the same donor/recipient pair
    async fn lock_pair(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<(), StoreError>;

    async fn donor(&mut self, id: RecordId) -> Result<Option<Donor>, StoreError>;

    async fn recipient(&mut self, id: RecordId) -> Result<Option<Recipient>, StoreError>;

    /// Most recent request for the pair by creation order
    async fn latest_request_for_pair(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Option<Request>, StoreError>;

    /// Insert a new pending request
    async fn insert_request(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Request, StoreError>;

    /// Load a request and hold it exclusively until the unit ends
    async fn request_for_update(&mut self, id: RecordId) -> Result<Option<Request>, StoreError>;

    async fn set_request_status(
        &mut self,
        id: RecordId,
        status: RequestStatus,
    ) -> Result<(), StoreError>;

    async fn insert_match(&mut self, new_match: &NewMatch) -> Result<Match, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Record store the engine reads and writes through
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn donor(&self, id: RecordId) -> Result<Option<Donor>, StoreError>;

    async fn recipient(&self, id: RecordId) -> Result<Option<Recipient>, StoreError>;

    async fn donors_offering(&self, organ: &str) -> Result<Vec<Donor>, StoreError>;

    async fn recipients_needing(&self, organ: &str) -> Result<Vec<Recipient>, StoreError>;

    /// Latest request status per donor for one recipient, by creation order
    async fn latest_request_statuses(
        &self,
        recipient_id: RecordId,
    ) -> Result<HashMap<RecordId, RequestStatus>, StoreError>;

    async fn pending_requests_for_donor(
        &self,
        donor_id: RecordId,
    ) -> Result<Vec<PendingRequest>, StoreError>;

    async fn accepted_requests_for_recipient(
        &self,
        recipient_id: RecordId,
    ) -> Result<Vec<AcceptedRequest>, StoreError>;

    /// Insert a batch of notifications atomically
    async fn insert_notifications(
        &self,
        batch: &[NewNotification],
    ) -> Result<Vec<Notification>, StoreError>;

    async fn notifications_for(&self, user_id: RecordId) -> Result<Vec<Notification>, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}
