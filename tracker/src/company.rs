use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::api::TrackerError;
use crate::attribution::AttributionResult;
use crate::router;

#[derive(Debug, Default, Deserialize)]
pub struct CompanyDetectPayload {
    pub ip: Option<String>,
}

/// Standalone attribution lookup: same engine the ingestion path uses, with
/// the caller supplying the IP.
#[instrument(skip_all)]
pub async fn company_detect(
    State(state): State<router::State>,
    Json(payload): Json<CompanyDetectPayload>,
) -> Result<Json<AttributionResult>, TrackerError> {
    let ip = payload
        .ip
        .filter(|ip| !ip.is_empty())
        .ok_or(TrackerError::MissingIp)?;

    Ok(Json(state.attribution.resolve(&ip).await))
}
