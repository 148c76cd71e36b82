use serde::{Deserialize, Serialize};

/// One stored page-view. Field names match the JSON the dashboard reads.
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorRecord {
    pub ip: String,
    pub user_agent: String,
    #[serde(default)]
    pub referrer: String,
    pub page: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    #[serde(default)]
    pub company_confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackPayload {
    pub page: Option<String>,
    pub referrer: Option<String>,
}

/// Store key for one record. Dots and colons in the address are replaced so
/// the key stays opaque and survives path-segment reads.
pub fn record_key(unix_millis: i128, ip: &str) -> String {
    format!("visitor:{}:{}", unix_millis, ip.replace(['.', ':'], "-"))
}
