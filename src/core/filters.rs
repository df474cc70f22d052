use crate::core::error::EngineError;
use crate::models::{FindMatchesParams, ScoreResult};
use std::cmp::Ordering;
use std::str::FromStr;

/// Field a result list can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CompatibilityScore,
    Distance,
    UrgencyScore,
    DonorId,
    DonorName,
    Organ,
    RequestStatus,
}

impl SortKey {
    /// Closer donors are better, so distance is the one ascending key
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortKey::Distance)
    }
}

impl FromStr for SortKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "compatibility_score" | "compatibilityScore" => Ok(SortKey::CompatibilityScore),
            "distance" => Ok(SortKey::Distance),
            "urgency_score" | "urgencyScore" => Ok(SortKey::UrgencyScore),
            "donor_id" | "donorId" => Ok(SortKey::DonorId),
            "donor_name" | "donorName" => Ok(SortKey::DonorName),
            "organ" => Ok(SortKey::Organ),
            "request_status" | "requestStatus" => Ok(SortKey::RequestStatus),
            other => Err(EngineError::Validation(format!("unknown sort key '{}'", other))),
        }
    }
}

/// Optional filter and ordering applied to scored matches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchQuery {
    pub sort_by: SortKey,
    /// Inclusive lower bound on compatibility, 0 when unset
    pub min_score: Option<f64>,
    /// Inclusive upper bound on distance in km, unbounded when unset
    pub max_distance: Option<f64>,
}

impl MatchQuery {
    pub fn sorted_by(sort_by: SortKey) -> Self {
        Self {
            sort_by,
            ..Self::default()
        }
    }

    pub fn min_score(&self) -> f64 {
        self.min_score.unwrap_or(0.0)
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance.unwrap_or(f64::INFINITY)
    }

    /// Check whether a result passes both bounds (full precision, inclusive)
    #[inline]
    pub fn accepts(&self, result: &ScoreResult) -> bool {
        result.compatibility_score >= self.min_score() && result.distance <= self.max_distance()
    }
}

impl TryFrom<&FindMatchesParams> for MatchQuery {
    type Error = EngineError;

    fn try_from(params: &FindMatchesParams) -> Result<Self, Self::Error> {
        let sort_by = match params.sort_by.as_deref() {
            Some(key) if !key.trim().is_empty() => key.parse()?,
            _ => SortKey::default(),
        };

        if let Some(max) = params.max_distance {
            if max.is_nan() || max < 0.0 {
                return Err(EngineError::Validation(format!(
                    "maxDistance must be a non-negative number, got {}",
                    max
                )));
            }
        }
        if params.min_score.is_some_and(f64::is_nan) {
            return Err(EngineError::Validation("minScore must be a number".to_string()));
        }

        Ok(Self {
            sort_by,
            min_score: params.min_score,
            max_distance: params.max_distance,
        })
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn compare_by(key: SortKey, a: &ScoreResult, b: &ScoreResult) -> Ordering {
    match key {
        SortKey::CompatibilityScore => compare_f64(a.compatibility_score, b.compatibility_score),
        SortKey::Distance => compare_f64(a.distance, b.distance),
        SortKey::UrgencyScore => a.urgency_score.cmp(&b.urgency_score),
        SortKey::DonorId => a.donor_id.cmp(&b.donor_id),
        SortKey::DonorName => a.donor_name.cmp(&b.donor_name),
        SortKey::Organ => a.organ.cmp(&b.organ),
        SortKey::RequestStatus => a.request_status.cmp(&b.request_status),
    }
}

/// Sort results in place
///
/// Descending for every key except distance, which is ascending. The sort
/// is stable so equal keys keep their retrieval order.
pub fn sort_results(results: &mut [ScoreResult], key: SortKey) {
    if key.is_ascending() {
        results.sort_by(|a, b| compare_by(key, a, b));
    } else {
        results.sort_by(|a, b| compare_by(key, b, a));
    }
}
