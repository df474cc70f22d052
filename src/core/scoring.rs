use crate::core::distance::haversine_distance;
use crate::models::{Donor, Recipient};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while scoring a single donor/recipient pair
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("unknown blood type '{0}'")]
    UnknownBloodType(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("scoring model failed: {0}")]
    Model(String),

    #[error("scoring artifact unavailable: {0}")]
    Artifact(String),
}

/// Blood types accepted by the engine
///
/// The encoding is total and fixed: codes follow the sorted label order
/// (`A+`, `A-`, `AB+`, `AB-`, `B+`, `B-`, `O+`, `O-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloodType {
    APos,
    ANeg,
    AbPos,
    AbNeg,
    BPos,
    BNeg,
    OPos,
    ONeg,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::APos,
        BloodType::ANeg,
        BloodType::AbPos,
        BloodType::AbNeg,
        BloodType::BPos,
        BloodType::BNeg,
        BloodType::OPos,
        BloodType::ONeg,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse a stored, possibly absent, blood type
    pub fn from_field(value: Option<&str>) -> Result<Self, ScoringError> {
        value
            .ok_or(ScoringError::MissingField("blood_type"))?
            .parse()
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodType {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        BloodType::ALL
            .into_iter()
            .find(|bt| bt.label() == normalized)
            .ok_or_else(|| ScoringError::UnknownBloodType(s.to_string()))
    }
}

/// Input to the predictive model
///
/// Field order is part of the model contract and must not change
/// independently of the artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub age_similarity: f64,
    pub distance_score: f64,
    pub urgency_level: f64,
}

impl FeatureVector {
    pub const LEN: usize = 3;

    pub fn as_array(&self) -> [f64; Self::LEN] {
        [self.age_similarity, self.distance_score, self.urgency_level]
    }
}

/// Pluggable predictive scoring function
#[async_trait]
pub trait ScoringModel: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, ScoringError>;

    fn name(&self) -> &str;
}

/// Everything computed for one donor/recipient pair
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub donor_blood_type: BloodType,
    pub recipient_blood_type: BloodType,
    pub distance_km: f64,
    pub features: FeatureVector,
    /// Full-precision model output
    pub score: f64,
}

/// `1 / (1 + |a - b|)`: 1.0 for equal ages, shrinking toward 0
#[inline]
pub fn age_similarity(donor_age: i32, recipient_age: i32) -> f64 {
    let gap = (donor_age as f64 - recipient_age as f64).abs();
    1.0 / (1.0 + gap)
}

/// `1 / (1 + km)`: bounded in (0, 1], decreasing with distance
#[inline]
pub fn distance_score(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km)
}

/// Validate a pair and derive its model inputs without running the model
pub fn prepare(
    donor: &Donor,
    recipient: &Recipient,
) -> Result<(BloodType, BloodType, f64, FeatureVector), ScoringError> {
    let donor_blood_type = BloodType::from_field(donor.blood_type.as_deref())?;
    let recipient_blood_type = BloodType::from_field(recipient.blood_type.as_deref())?;
    let urgency = recipient
        .urgency_level
        .ok_or(ScoringError::MissingField("urgency_level"))?;

    let distance_km = haversine_distance(
        recipient.latitude,
        recipient.longitude,
        donor.latitude,
        donor.longitude,
    );

    let features = FeatureVector {
        age_similarity: age_similarity(donor.age, recipient.age),
        distance_score: distance_score(distance_km),
        urgency_level: urgency as f64,
    };

    Ok((donor_blood_type, recipient_blood_type, distance_km, features))
}

/// Combines blood type, age, distance and urgency into one score
#[derive(Clone)]
pub struct CompatibilityScorer {
    model: Arc<dyn ScoringModel>,
}

impl CompatibilityScorer {
    pub fn new(model: Arc<dyn ScoringModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Score a donor for a recipient
    ///
    /// Any error excludes only this pair; callers keep going with the batch.
    pub async fn score(
        &self,
        donor: &Donor,
        recipient: &Recipient,
    ) -> Result<Assessment, ScoringError> {
        let (donor_blood_type, recipient_blood_type, distance_km, features) =
            prepare(donor, recipient)?;

        let score = self.model.predict(&features).await?;
        if !score.is_finite() {
            return Err(ScoringError::Model(format!("non-finite score {}", score)));
        }

        Ok(Assessment {
            donor_blood_type,
            recipient_blood_type,
            distance_km,
            features,
            score,
        })
    }
}

impl fmt::Debug for CompatibilityScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibilityScorer")
            .field("model", &self.model.name())
            .finish()
    }
}
