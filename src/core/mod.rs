// Core engine exports
pub mod distance;
pub mod error;
pub mod filters;
pub mod lifecycle;
pub mod matcher;
pub mod notify;
pub mod scoring;

pub use distance::haversine_distance;
pub use error::EngineError;
pub use filters::{sort_results, MatchQuery, SortKey};
pub use lifecycle::RequestLifecycle;
pub use matcher::MatchFinder;
pub use notify::NotificationDispatcher;
pub use scoring::{
    age_similarity, distance_score, prepare, Assessment, BloodType, CompatibilityScorer, FeatureVector,
    ScoringError, ScoringModel,
};

use crate::models::RecordId;
use crate::services::{EventBus, Gateway};
use std::sync::Arc;

/// Matching, lifecycle and notification components wired to one store
#[derive(Clone)]
pub struct Engine {
    gateway: Arc<dyn Gateway>,
    finder: MatchFinder,
    lifecycle: RequestLifecycle,
    dispatcher: NotificationDispatcher,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        bus: Arc<dyn EventBus>,
        model: Arc<dyn ScoringModel>,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(Arc::clone(&gateway), bus);
        let finder = MatchFinder::new(Arc::clone(&gateway), CompatibilityScorer::new(model));
        let lifecycle = RequestLifecycle::new(Arc::clone(&gateway), dispatcher.clone());

        Self {
            gateway,
            finder,
            lifecycle,
            dispatcher,
        }
    }

    pub fn finder(&self) -> &MatchFinder {
        &self.finder
    }

    pub fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Announce a stored donor to every recipient needing their organ
    pub async fn announce_donor(&self, donor_id: RecordId) -> Result<usize, EngineError> {
        let donor = self
            .gateway
            .donor(donor_id)
            .await?
            .ok_or_else(|| EngineError::not_found("donor", donor_id))?;

        self.dispatcher
            .notify_new_donor(&donor.organ, &donor.full_name)
            .await
    }
}
