//! LifeLink Match - donor/recipient matching and request lifecycle engine
//!
//! This library ranks organ donors for a recipient with a pluggable scoring
//! model, manages the pending/accepted/declined request lifecycle atomically,
//! and fans out notifications to persisted inboxes and live channels.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    haversine_distance, CompatibilityScorer, Engine, EngineError, MatchFinder, MatchQuery,
    NotificationDispatcher, RequestLifecycle, ScoringModel, SortKey,
};
pub use models::{Donor, Match, Notification, Recipient, Request, RequestStatus, ScoreResult};
pub use services::{EventBus, Gateway, LocalBus, MemoryStore};
