use crate::core::scoring::{FeatureVector, ScoringError, ScoringModel};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-feature standardization applied before the regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regressor {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// On-disk form of a linear scoring artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearArtifact {
    pub scaler: Scaler,
    pub regressor: Regressor,
}

/// Linear regressor over standardized features
///
/// `score = intercept + Σ w[i] * (x[i] - mean[i]) / scale[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    mean: [f64; FeatureVector::LEN],
    scale: [f64; FeatureVector::LEN],
    weights: [f64; FeatureVector::LEN],
    intercept: f64,
}

fn fixed_len(name: &str, values: &[f64]) -> Result<[f64; FeatureVector::LEN], ScoringError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ScoringError::Artifact(format!("{} contains a non-finite value", name)));
    }
    values.try_into().map_err(|_| {
        ScoringError::Artifact(format!(
            "{} must have {} entries, found {}",
            name,
            FeatureVector::LEN,
            values.len()
        ))
    })
}

impl LinearModel {
    /// Plain linear function of the raw features, no standardization
    pub fn new(weights: [f64; FeatureVector::LEN], intercept: f64) -> Self {
        Self {
            mean: [0.0; FeatureVector::LEN],
            scale: [1.0; FeatureVector::LEN],
            weights,
            intercept,
        }
    }

    pub fn from_artifact(artifact: &LinearArtifact) -> Result<Self, ScoringError> {
        let mean = fixed_len("scaler.mean", &artifact.scaler.mean)?;
        let scale = fixed_len("scaler.scale", &artifact.scaler.scale)?;
        let weights = fixed_len("regressor.weights", &artifact.regressor.weights)?;

        if scale.iter().any(|s| *s <= 0.0) {
            return Err(ScoringError::Artifact("scaler.scale entries must be positive".to_string()));
        }
        if !artifact.regressor.intercept.is_finite() {
            return Err(ScoringError::Artifact("regressor.intercept must be finite".to_string()));
        }

        Ok(Self {
            mean,
            scale,
            weights,
            intercept: artifact.regressor.intercept,
        })
    }

    /// Load an artifact from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScoringError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact: LinearArtifact = toml::from_str(&raw).map_err(|e| {
            ScoringError::Artifact(format!("cannot parse {}: {}", path.display(), e))
        })?;

        let model = Self::from_artifact(&artifact)?;
        tracing::info!("Loaded linear scoring artifact from {}", path.display());
        Ok(model)
    }

    #[inline]
    pub fn evaluate(&self, features: &FeatureVector) -> f64 {
        features
            .as_array()
            .iter()
            .enumerate()
            .fold(self.intercept, |acc, (i, x)| {
                acc + self.weights[i] * (x - self.mean[i]) / self.scale[i]
            })
    }
}

#[async_trait]
impl ScoringModel for LinearModel {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        Ok(self.evaluate(features))
    }

    fn name(&self) -> &str {
        "linear"
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    features: [f64; FeatureVector::LEN],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    score: f64,
}

/// Scoring model served by a remote HTTP service
///
/// `POST {endpoint}/predict` with `{"features": [age_similarity,
/// distance_score, urgency_level]}` answering `{"score": <f64>}`.
pub struct RemoteModel {
    endpoint: String,
    client: Client,
}

impl RemoteModel {
    /// Build the client and check `{endpoint}/health` once
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoringError::Artifact(format!("cannot build HTTP client: {}", e)))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let health_url = format!("{}/health", endpoint);

        let response = client
            .get(&health_url)
            .send()
            .await
            .map_err(|e| ScoringError::Artifact(format!("scoring service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ScoringError::Artifact(format!(
                "scoring service health check returned {}",
                response.status()
            )));
        }

        tracing::info!("Connected to remote scoring service at {}", endpoint);
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ScoringModel for RemoteModel {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        let url = format!("{}/predict", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&PredictRequest {
                features: features.as_array(),
            })
            .send()
            .await
            .map_err(|e| ScoringError::Model(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScoringError::Model(format!(
                "scoring service returned {}",
                response.status()
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Model(format!("invalid scoring response: {}", e)))?;

        Ok(body.score)
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"
        [scaler]
        mean = [0.5, 0.1, 5.0]
        scale = [0.25, 0.1, 2.0]

        [regressor]
        weights = [1.0, 2.0, 0.5]
        intercept = 3.0
    "#;

    fn features() -> FeatureVector {
        FeatureVector {
            age_similarity: 1.0,
            distance_score: 0.3,
            urgency_level: 9.0,
        }
    }

    #[test]
    fn test_artifact_standardizes_then_regresses() {
        let artifact: LinearArtifact = toml::from_str(ARTIFACT).unwrap();
        let model = LinearModel::from_artifact(&artifact).unwrap();

        // 3 + 1*(0.5/0.25) + 2*(0.2/0.1) + 0.5*(4/2) = 3 + 2 + 4 + 1
        assert!((model.evaluate(&features()) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_artifact_rejects_wrong_length() {
        let mut artifact: LinearArtifact = toml::from_str(ARTIFACT).unwrap();
        artifact.regressor.weights.pop();
        assert!(matches!(LinearModel::from_artifact(&artifact), Err(ScoringError::Artifact(_))));
    }

    #[test]
    fn test_artifact_rejects_zero_scale() {
        let mut artifact: LinearArtifact = toml::from_str(ARTIFACT).unwrap();
        artifact.scaler.scale[1] = 0.0;
        assert!(LinearModel::from_artifact(&artifact).is_err());
    }

    #[test]
    fn test_missing_artifact_file_is_an_error() {
        let result = LinearModel::load("/nonexistent/lifelink/model.toml");
        assert!(matches!(result, Err(ScoringError::Artifact(_))));
    }

    #[tokio::test]
    async fn test_remote_model_posts_features() {
        let mut server = mockito::Server::new_async().await;
        let health = server.mock("GET", "/health").with_status(200).create_async().await;
        let predict = server
            .mock("POST", "/predict")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "features": [1.0, 0.3, 9.0]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"score": 4.25}"#)
            .create_async()
            .await;

        let model = RemoteModel::connect(&server.url(), Duration::from_secs(5))
            .await
            .unwrap();
        let score = model.predict(&features()).await.unwrap();

        assert_eq!(score, 4.25);
        health.assert_async().await;
        predict.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_model_unhealthy_service_fails_at_connect() {
        let mut server = mockito::Server::new_async().await;
        let _health = server.mock("GET", "/health").with_status(503).create_async().await;

        let result = RemoteModel::connect(&server.url(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ScoringError::Artifact(_))));
    }

    #[tokio::test]
    async fn test_remote_model_error_status_is_model_error() {
        let mut server = mockito::Server::new_async().await;
        let _health = server.mock("GET", "/health").with_status(200).create_async().await;
        let _predict = server.mock("POST", "/predict").with_status(500).create_async().await;

        let model = RemoteModel::connect(&server.url(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(model.predict(&features()).await, Err(ScoringError::Model(_))));
    }
}
