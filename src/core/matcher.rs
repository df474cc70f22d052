use crate::core::error::EngineError;
use crate::core::filters::{sort_results, MatchQuery, SortKey};
use crate::core::scoring::CompatibilityScorer;
use crate::models::{MapPin, MapView, RecordId, ScoreResult};
use crate::services::Gateway;
use std::sync::Arc;

/// Scores and ranks candidate donors for a recipient
///
/// # Pipeline Stages
/// 1. Resolve the recipient
/// 2. Load donors offering the needed organ
/// 3. Score each pair, dropping pairs that fail validation
/// 4. Attach the latest request status per donor
/// 5. Filter (only when a query is given) and sort
///
/// Read-only; results are computed fresh on every call.
#[derive(Clone)]
pub struct MatchFinder {
    gateway: Arc<dyn Gateway>,
    scorer: CompatibilityScorer,
}

impl MatchFinder {
    pub fn new(gateway: Arc<dyn Gateway>, scorer: CompatibilityScorer) -> Self {
        Self { gateway, scorer }
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Find ranked donor matches for a recipient
    ///
    /// # Arguments
    /// * `recipient_id` - Recipient to match for
    /// * `query` - Optional filter and sort key; without one every scored
    ///   pair is returned ordered by compatibility
    ///
    /// # Returns
    /// Ordered results, empty when no donor offers the needed organ
    pub async fn find_matches(
        &self,
        recipient_id: RecordId,
        query: Option<&MatchQuery>,
    ) -> Result<Vec<ScoreResult>, EngineError> {
        let recipient = self
            .gateway
            .recipient(recipient_id)
            .await?
            .ok_or_else(|| EngineError::not_found("recipient", recipient_id))?;

        let donors = self.gateway.donors_offering(&recipient.needed_organ).await?;
        if donors.is_empty() {
            tracing::debug!("No donors offer {} for recipient {}", recipient.needed_organ, recipient_id);
            return Ok(Vec::new());
        }

        let statuses = self.gateway.latest_request_statuses(recipient_id).await?;
        let total_candidates = donors.len();

        let mut results = Vec::with_capacity(total_candidates);
        for donor in donors {
            let assessment = match self.scorer.score(&donor, &recipient).await {
                Ok(assessment) => assessment,
                Err(e) => {
                    tracing::warn!(
                        "Excluding donor {} for recipient {}: {}",
                        donor.id,
                        recipient_id,
                        e
                    );
                    continue;
                }
            };

            results.push(ScoreResult {
                donor_id: donor.id,
                request_status: statuses.get(&donor.id).copied(),
                donor_name: donor.full_name,
                organ: donor.organ,
                distance: assessment.distance_km,
                // Scoring already rejected a missing urgency level
                urgency_score: recipient.urgency_level.unwrap_or_default(),
                compatibility_score: assessment.score,
            });
        }

        let sort_by = match query {
            Some(query) => {
                results.retain(|r| query.accepts(r));
                query.sort_by
            }
            None => SortKey::default(),
        };
        sort_results(&mut results, sort_by);

        tracing::debug!(
            "Returning {} matches for recipient {} (from {} candidates)",
            results.len(),
            recipient_id,
            total_candidates
        );

        Ok(results)
    }

    /// Recipient location with every donor offering the needed organ
    pub async fn map_view(&self, recipient_id: RecordId) -> Result<MapView, EngineError> {
        let recipient = self
            .gateway
            .recipient(recipient_id)
            .await?
            .ok_or_else(|| EngineError::not_found("recipient", recipient_id))?;

        let donors = self
            .gateway
            .donors_offering(&recipient.needed_organ)
            .await?
            .into_iter()
            .map(|d| MapPin {
                id: d.id,
                name: d.full_name,
                latitude: d.latitude,
                longitude: d.longitude,
                organ: d.organ,
            })
            .collect();

        Ok(MapView {
            recipient: MapPin {
                id: recipient.id,
                name: recipient.full_name,
                latitude: recipient.latitude,
                longitude: recipient.longitude,
                organ: recipient.needed_organ,
            },
            donors,
        })
    }
}
