// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Batch sync trigger request
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Re-enrich every record, not only the pending ones
    #[serde(default)]
    pub force_resync: bool,
}

/// Manually add a library entry attached to a specific catalog match
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub title: String,
    pub source: String,
    pub remote_id: i64,
}

/// Per-record re-sync request
#[derive(Debug, Serialize, Deserialize)]
pub struct ResyncRequest {
    pub source: String,
}

/// Free-text catalog search query
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Library dashboard counters
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_games: i64,
    pub rawg_synced: i64,
    pub igdb_synced: i64,
    pub local_multiplayer: i64,
    pub online_multiplayer: i64,
}
