use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cost::Cost;
use super::model::Model;
use super::token::Token;

/// A single ingested API request event. Immutable after construction.
///
/// Storage identity is `(timestamp, session_id)`: two records sharing both
/// are the same write (idempotent upsert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: Model,
    pub token: Token,
    pub cost: Cost,
    pub duration_ms: u64,
}

impl Request {
    pub fn new(
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        model: Model,
        token: Token,
        cost: Cost,
        duration_ms: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp,
            model,
            token,
            cost,
            duration_ms,
        }
    }
}
