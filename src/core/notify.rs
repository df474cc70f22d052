use crate::core::error::EngineError;
use crate::models::{
    ChannelEvent, EventKind, NewNotification, Notification, NotificationKind, RecordId, Request,
    RequestUpdate,
};
use crate::services::{ChannelKey, EventBus, Gateway};
use std::sync::Arc;

/// Fans events out to interested parties
///
/// Persisted notifications are the durable record. Channel events are a
/// live convenience: publish failures are logged and never surface to the
/// operation that triggered them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn Gateway>,
    bus: Arc<dyn EventBus>,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn Gateway>, bus: Arc<dyn EventBus>) -> Self {
        Self { gateway, bus }
    }

    /// Tell every recipient needing `organ` that a donor is available
    ///
    /// Writes one `new_donor` notification per recipient and publishes to
    /// each recipient's channel. Returns the number of notifications written.
    pub async fn notify_new_donor(&self, organ: &str, donor_name: &str) -> Result<usize, EngineError> {
        let recipients = self.gateway.recipients_needing(organ).await?;
        if recipients.is_empty() {
            tracing::debug!("No recipients need {}, nothing to notify", organ);
            return Ok(0);
        }

        let message = format!("New donor available: {} for organ: {}", donor_name, organ);
        let batch: Vec<NewNotification> = recipients
            .iter()
            .map(|r| NewNotification {
                user_id: r.id,
                message: message.clone(),
                kind: NotificationKind::NewDonor,
            })
            .collect();

        let written = self.gateway.insert_notifications(&batch).await?;

        let payload = serde_json::json!({
            "organ": organ,
            "donorName": donor_name,
            "message": message,
        });
        for recipient in &recipients {
            let event = ChannelEvent::new(EventKind::NewDonor, payload.clone());
            self.publish(&ChannelKey::recipient(recipient.id), &event).await;
        }

        tracing::info!(
            "Notified {} recipients about new {} donor {}",
            written.len(),
            organ,
            donor_name
        );
        Ok(written.len())
    }

    /// Signal both parties of a resolved request; not persisted
    pub async fn notify_request_update(
        &self,
        donor_channel: &str,
        recipient_channel: &str,
        payload: &RequestUpdate,
    ) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to encode request update: {}", e);
                return;
            }
        };

        for channel in [donor_channel, recipient_channel] {
            let event = ChannelEvent::new(EventKind::RequestUpdate, payload.clone());
            self.publish(channel, &event).await;
        }
    }

    /// Signal a donor that a new request is waiting; not persisted
    pub async fn notify_new_request(&self, request: &Request) {
        let event = ChannelEvent::new(
            EventKind::NewRequest,
            serde_json::json!({
                "requestId": request.id,
                "donorId": request.donor_id,
                "recipientId": request.recipient_id,
                "status": request.status,
            }),
        );
        self.publish(&ChannelKey::donor(request.donor_id), &event).await;
    }

    pub async fn notifications_for(&self, user_id: RecordId) -> Result<Vec<Notification>, EngineError> {
        Ok(self.gateway.notifications_for(user_id).await?)
    }

    async fn publish(&self, channel: &str, event: &ChannelEvent) {
        match self.bus.publish(channel, event).await {
            Ok(0) => tracing::debug!("No listeners on {} for {:?}", channel, event.kind),
            Ok(n) => tracing::debug!("Delivered {:?} to {} listeners on {}", event.kind, n, channel),
            Err(e) => tracing::warn!("Failed to publish {:?} to {}: {}", event.kind, channel, e),
        }
    }
}
