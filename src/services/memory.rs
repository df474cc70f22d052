//! In-process record store.
//!
//! Every table lives behind one async mutex. A unit of work holds the lock
//! for its whole lifetime and writes to a staged copy, which replaces the
//! live tables only on commit. Units therefore serialize completely and a
//! dropped unit leaves no trace.

use crate::models::{
    AcceptedRequest, Donor, Match, NewMatch, NewNotification, Notification, PendingRequest,
    Recipient, RecordId, Request, RequestStatus,
};
use crate::services::gateway::{Gateway, StoreError, UnitOfWork};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Write a unit can be told to fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertRequest,
    SetRequestStatus,
    InsertMatch,
    InsertNotifications,
}

impl FailPoint {
    fn label(&self) -> &'static str {
        match self {
            FailPoint::InsertRequest => "insert_request",
            FailPoint::SetRequestStatus => "set_request_status",
            FailPoint::InsertMatch => "insert_match",
            FailPoint::InsertNotifications => "insert_notifications",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    donors: BTreeMap<RecordId, Donor>,
    recipients: BTreeMap<RecordId, Recipient>,
    requests: BTreeMap<RecordId, Request>,
    matches: BTreeMap<RecordId, Match>,
    notifications: BTreeMap<RecordId, Notification>,
}

fn next_id<T>(table: &BTreeMap<RecordId, T>) -> RecordId {
    table.keys().next_back().map_or(1, |last| last + 1)
}

impl Tables {
    fn latest_request_for_pair(&self, donor_id: RecordId, recipient_id: RecordId) -> Option<&Request> {
        self.requests
            .values()
            .filter(|r| r.donor_id == donor_id && r.recipient_id == recipient_id)
            .max_by_key(|r| (r.created_at, r.id))
    }
}

/// Point-in-time copy of table sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub donors: usize,
    pub recipients: usize,
    pub requests: usize,
    pub matches: usize,
    pub notifications: usize,
}

/// In-memory implementation of the persistence contract
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_point: Arc<StdMutex<Option<FailPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a donor, assigning an id when the given one is 0
    pub async fn insert_donor(&self, mut donor: Donor) -> Donor {
        let mut tables = self.tables.lock().await;
        if donor.id == 0 {
            donor.id = next_id(&tables.donors);
        }
        tables.donors.insert(donor.id, donor.clone());
        donor
    }

    /// Register a recipient, assigning an id when the given one is 0
    pub async fn insert_recipient(&self, mut recipient: Recipient) -> Recipient {
        let mut tables = self.tables.lock().await;
        if recipient.id == 0 {
            recipient.id = next_id(&tables.recipients);
        }
        tables.recipients.insert(recipient.id, recipient.clone());
        recipient
    }

    /// Store a request row as-is, bypassing the lifecycle checks
    ///
    /// Models rows written by a concurrent writer that skipped the
    /// duplicate check.
    pub async fn insert_raw_request(&self, request: Request) {
        let mut tables = self.tables.lock().await;
        tables.requests.insert(request.id, request);
    }

    /// Make every later write of the given kind fail until cleared
    pub fn set_fail_point(&self, fail_point: Option<FailPoint>) {
        let mut guard = self.fail_point.lock().unwrap_or_else(|e| e.into_inner());
        *guard = fail_point;
    }

    fn current_fail_point(&self) -> Option<FailPoint> {
        *self.fail_point.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn counts(&self) -> TableCounts {
        let tables = self.tables.lock().await;
        TableCounts {
            donors: tables.donors.len(),
            recipients: tables.recipients.len(),
            requests: tables.requests.len(),
            matches: tables.matches.len(),
            notifications: tables.notifications.len(),
        }
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.tables.lock().await.requests.values().cloned().collect()
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.tables.lock().await.matches.values().cloned().collect()
    }
}

struct MemoryUnit {
    live: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_point: Option<FailPoint>,
}

impl MemoryUnit {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.fail_point == Some(point) {
            return Err(StoreError::Injected(point.label()));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_pair(&mut self, _donor_id: RecordId, _recipient_id: RecordId) -> Result<(), StoreError> {
        // The unit already holds the whole store
        Ok(())
    }

    async fn donor(&mut self, id: RecordId) -> Result<Option<Donor>, StoreError> {
        Ok(self.staged.donors.get(&id).cloned())
    }

    async fn recipient(&mut self, id: RecordId) -> Result<Option<Recipient>, StoreError> {
        Ok(self.staged.recipients.get(&id).cloned())
    }

    async fn latest_request_for_pair(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Option<Request>, StoreError> {
        Ok(self.staged.latest_request_for_pair(donor_id, recipient_id).cloned())
    }

    async fn insert_request(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Request, StoreError> {
        self.check(FailPoint::InsertRequest)?;
        let request = Request {
            id: next_id(&self.staged.requests),
            donor_id,
            recipient_id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        self.staged.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn request_for_update(&mut self, id: RecordId) -> Result<Option<Request>, StoreError> {
        Ok(self.staged.requests.get(&id).cloned())
    }

    async fn set_request_status(&mut self, id: RecordId, status: RequestStatus) -> Result<(), StoreError> {
        self.check(FailPoint::SetRequestStatus)?;
        let request = self
            .staged
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("request {}", id)))?;
        request.status = status;
        Ok(())
    }

    async fn insert_match(&mut self, new_match: &NewMatch) -> Result<Match, StoreError> {
        self.check(FailPoint::InsertMatch)?;
        let record = Match {
            id: next_id(&self.staged.matches),
            donor_id: new_match.donor_id,
            recipient_id: new_match.recipient_id,
            donor_name: new_match.donor_name.clone(),
            recipient_name: new_match.recipient_name.clone(),
            organ: new_match.organ.clone(),
            matched_at: Utc::now(),
        };
        self.staged.matches.insert(record.id, record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnit { mut live, staged, .. } = *self;
        *live = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let live = Arc::clone(&self.tables).lock_owned().await;
        let staged = live.clone();
        Ok(Box::new(MemoryUnit {
            live,
            staged,
            fail_point: self.current_fail_point(),
        }))
    }

    async fn donor(&self, id: RecordId) -> Result<Option<Donor>, StoreError> {
        Ok(self.tables.lock().await.donors.get(&id).cloned())
    }

    async fn recipient(&self, id: RecordId) -> Result<Option<Recipient>, StoreError> {
        Ok(self.tables.lock().await.recipients.get(&id).cloned())
    }

    async fn donors_offering(&self, organ: &str) -> Result<Vec<Donor>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .donors
            .values()
            .filter(|d| d.organ == organ)
            .cloned()
            .collect())
    }

    async fn recipients_needing(&self, organ: &str) -> Result<Vec<Recipient>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipients
            .values()
            .filter(|r| r.needed_organ == organ)
            .cloned()
            .collect())
    }

    async fn latest_request_statuses(
        &self,
        recipient_id: RecordId,
    ) -> Result<HashMap<RecordId, RequestStatus>, StoreError> {
        let tables = self.tables.lock().await;
        let mut latest: HashMap<RecordId, &Request> = HashMap::new();
        for request in tables.requests.values().filter(|r| r.recipient_id == recipient_id) {
            let newer = latest
                .get(&request.donor_id)
                .map_or(true, |seen| (request.created_at, request.id) > (seen.created_at, seen.id));
            if newer {
                latest.insert(request.donor_id, request);
            }
        }
        Ok(latest.into_iter().map(|(donor_id, r)| (donor_id, r.status)).collect())
    }

    async fn pending_requests_for_donor(&self, donor_id: RecordId) -> Result<Vec<PendingRequest>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .requests
            .values()
            .filter(|r| r.donor_id == donor_id && r.status == RequestStatus::Pending)
            .filter_map(|r| {
                tables.recipients.get(&r.recipient_id).map(|rec| PendingRequest {
                    id: r.id,
                    status: r.status,
                    recipient_id: r.recipient_id,
                    recipient_name: rec.full_name.clone(),
                })
            })
            .collect())
    }

    async fn accepted_requests_for_recipient(
        &self,
        recipient_id: RecordId,
    ) -> Result<Vec<AcceptedRequest>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .requests
            .values()
            .filter(|r| r.recipient_id == recipient_id && r.status == RequestStatus::Accepted)
            .filter_map(|r| {
                tables.donors.get(&r.donor_id).map(|d| AcceptedRequest {
                    request_id: r.id,
                    donor_id: d.id,
                    donor_name: d.full_name.clone(),
                    organ: d.organ.clone(),
                })
            })
            .collect())
    }

    async fn insert_notifications(&self, batch: &[NewNotification]) -> Result<Vec<Notification>, StoreError> {
        if self.current_fail_point() == Some(FailPoint::InsertNotifications) {
            return Err(StoreError::Injected(FailPoint::InsertNotifications.label()));
        }

        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut written = Vec::with_capacity(batch.len());
        for new in batch {
            let notification = Notification {
                id: next_id(&tables.notifications),
                user_id: new.user_id,
                message: new.message.clone(),
                kind: new.kind,
                created_at: now,
            };
            tables.notifications.insert(notification.id, notification.clone());
            written.push(notification);
        }
        Ok(written)
    }

    async fn notifications_for(&self, user_id: RecordId) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}
