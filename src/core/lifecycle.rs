//! Donor/recipient request state machine.
//!
//! ```text
//! pending ──accept──▶ accepted
//!    │
//!    └────decline───▶ declined
//! ```
//!
//! Creation and resolution each run as one unit of work. The unit runs on
//! a detached task, so a caller that goes away mid-operation cannot leave
//! a unit half-applied: it still commits or rolls back.

use crate::core::error::EngineError;
use crate::core::notify::NotificationDispatcher;
use crate::models::{
    AcceptedRequest, Decision, NewMatch, PendingRequest, RecordId, Request,
    RequestUpdate, Resolution,
};
use crate::services::{ChannelKey, Gateway, StoreError, UnitOfWork};
use std::future::Future;
use std::sync::Arc;

/// Notification owed to both parties once an acceptance commits
struct AcceptedParties {
    donor_email: String,
    recipient_email: String,
    update: RequestUpdate,
}

#[derive(Clone)]
pub struct RequestLifecycle {
    gateway: Arc<dyn Gateway>,
    dispatcher: NotificationDispatcher,
}

impl RequestLifecycle {
    pub fn new(gateway: Arc<dyn Gateway>, dispatcher: NotificationDispatcher) -> Self {
        Self { gateway, dispatcher }
    }

    /// Open a pending request between a donor and a recipient
    ///
    /// Fails with `NotFound` when either party is missing and with
    /// `Conflict` when any request already exists for the pair.
    pub async fn create_request(
        &self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Request, EngineError> {
        let gateway = Arc::clone(&self.gateway);
        let request = run_detached(async move {
            let mut unit = gateway.begin().await?;
            let outcome = create_in(unit.as_mut(), donor_id, recipient_id).await;
            finish(unit, outcome).await
        })
        .await?;

        tracing::info!(
            "Created request {} (donor {} -> recipient {})",
            request.id,
            donor_id,
            recipient_id
        );

        self.dispatcher.notify_new_request(&request).await;
        Ok(request)
    }

    /// Accept or decline a request
    ///
    /// Resolving a request that is already accepted or declined changes
    /// nothing and returns its current status.
    pub async fn resolve_request(
        &self,
        request_id: RecordId,
        decision: Decision,
    ) -> Result<Resolution, EngineError> {
        let gateway = Arc::clone(&self.gateway);
        let (resolution, parties) = run_detached(async move {
            let mut unit = gateway.begin().await?;
            let outcome = resolve_in(unit.as_mut(), request_id, decision).await;
            finish(unit, outcome).await
        })
        .await?;

        if resolution.already_resolved {
            tracing::info!(
                "Request {} already {}, ignoring {:?}",
                request_id,
                resolution.status,
                decision
            );
        } else {
            tracing::info!("Request {} is now {}", request_id, resolution.status);
        }

        if let Some(parties) = parties {
            self.dispatcher
                .notify_request_update(
                    &ChannelKey::email(&parties.donor_email),
                    &ChannelKey::email(&parties.recipient_email),
                    &parties.update,
                )
                .await;
        }

        Ok(resolution)
    }

    pub async fn list_pending_requests(&self, donor_id: RecordId) -> Result<Vec<PendingRequest>, EngineError> {
        Ok(self.gateway.pending_requests_for_donor(donor_id).await?)
    }

    pub async fn list_accepted_requests(
        &self,
        recipient_id: RecordId,
    ) -> Result<Vec<AcceptedRequest>, EngineError> {
        Ok(self.gateway.accepted_requests_for_recipient(recipient_id).await?)
    }
}

/// Run a unit on its own task and wait for it
async fn run_detached<T, F>(unit: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    tokio::spawn(unit)
        .await
        .map_err(|e| EngineError::Persistence(StoreError::Aborted(e.to_string())))?
}

/// Commit on success, roll back on failure
async fn finish<T>(
    unit: Box<dyn UnitOfWork>,
    outcome: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match outcome {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                tracing::error!("Rollback failed after {}: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

async fn create_in(
    unit: &mut dyn UnitOfWork,
    donor_id: RecordId,
    recipient_id: RecordId,
) -> Result<Request, EngineError> {
    unit.lock_pair(donor_id, recipient_id).await?;

    if unit.donor(donor_id).await?.is_none() {
        return Err(EngineError::not_found("donor", donor_id));
    }
    if unit.recipient(recipient_id).await?.is_none() {
        return Err(EngineError::not_found("recipient", recipient_id));
    }

    if let Some(existing) = unit.latest_request_for_pair(donor_id, recipient_id).await? {
        return Err(EngineError::Conflict {
            request_id: existing.id,
            existing: existing.status,
        });
    }

    Ok(unit.insert_request(donor_id, recipient_id).await?)
}

async fn resolve_in(
    unit: &mut dyn UnitOfWork,
    request_id: RecordId,
    decision: Decision,
) -> Result<(Resolution, Option<AcceptedParties>), EngineError> {
    let request = unit
        .request_for_update(request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("request", request_id))?;

    if request.status.is_terminal() {
        let resolution = Resolution {
            request_id,
            status: request.status,
            already_resolved: true,
            match_record: None,
        };
        return Ok((resolution, None));
    }

    let status = decision.target_status();
    match decision {
        Decision::Decline => {
            unit.set_request_status(request_id, status).await?;
            let resolution = Resolution {
                request_id,
                status,
                already_resolved: false,
                match_record: None,
            };
            Ok((resolution, None))
        }
        Decision::Accept => {
            let donor = unit
                .donor(request.donor_id)
                .await?
                .ok_or_else(|| EngineError::not_found("donor", request.donor_id))?;
            let recipient = unit
                .recipient(request.recipient_id)
                .await?
                .ok_or_else(|| EngineError::not_found("recipient", request.recipient_id))?;

            let record = unit
                .insert_match(&NewMatch {
                    donor_id: donor.id,
                    recipient_id: recipient.id,
                    donor_name: donor.full_name.clone(),
                    recipient_name: recipient.full_name.clone(),
                    organ: donor.organ.clone(),
                })
                .await?;
            unit.set_request_status(request_id, status).await?;

            let parties = AcceptedParties {
                donor_email: donor.email,
                recipient_email: recipient.email,
                update: RequestUpdate {
                    status,
                    donor_name: donor.full_name,
                    recipient_name: recipient.full_name,
                    organ: donor.organ,
                },
            };
            let resolution = Resolution {
                request_id,
                status,
                already_resolved: false,
                match_record: Some(record),
            };
            Ok((resolution, Some(parties)))
        }
    }
}
