use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::visitor::VisitorRecord;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackResponse {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorStats {
    /// Approximation of total-seen: the resolved page size plus the offset.
    /// The store exposes no cheap count primitive, so this is not a true
    /// total across all stored visitors.
    pub total: usize,
    pub today: u64,
    pub unique_companies: usize,
    pub company_counts: HashMap<String, u64>,
    pub country_counts: HashMap<String, u64>,
    pub referrer_counts: HashMap<String, u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VisitorsResponse {
    pub visitors: Vec<VisitorRecord>,
    pub stats: VisitorStats,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("ip address required")]
    MissingIp,
    #[error("subject and body required")]
    MissingNotificationFields,

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = match self {
            TrackerError::MissingIp | TrackerError::MissingNotificationFields => {
                StatusCode::BAD_REQUEST
            }

            TrackerError::Unauthorized => StatusCode::UNAUTHORIZED,

            TrackerError::Internal(ref err) => {
                // Full detail stays in the logs; the caller only sees the
                // generic message from Display.
                tracing::error!("request failed: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
