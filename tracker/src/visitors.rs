use std::collections::{HashMap, HashSet};

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::api::{TrackerError, VisitorStats, VisitorsResponse};
use crate::router;
use crate::time;
use crate::visitor::VisitorRecord;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct VisitorsQuery {
    // Kept as strings so an unparsable value falls back to the default
    // instead of rejecting the request.
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Read a page of recent visitors and recompute the dashboard statistics
/// over that page. Degrades to an empty result set when the store is
/// unconfigured or unreachable.
#[instrument(skip_all, fields(limit, offset))]
pub async fn visitors(
    State(state): State<router::State>,
    Query(query): Query<VisitorsQuery>,
    headers: HeaderMap,
) -> Result<Json<VisitorsResponse>, TrackerError> {
    authorize(&state, &headers)?;

    let limit = parse_param(query.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = parse_param(query.offset.as_deref(), 0);
    tracing::Span::current().record("limit", limit);
    tracing::Span::current().record("offset", offset);

    let Some(store) = &state.store else {
        return Ok(Json(VisitorsResponse::default()));
    };

    let ids = match store.range_recent(offset, limit).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!("failed to read recent visitors: {:#}", err);
            return Ok(Json(VisitorsResponse::default()));
        }
    };

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        // Absent or garbled entries are skipped silently.
        match store.get_record(id).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => tracing::debug!("failed to fetch record {}: {:#}", id, err),
        }
    }

    let today = time::daily_key(state.timesource.now());
    let today_count = match store.daily_count(&today).await {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!("failed to read daily counter: {:#}", err);
            0
        }
    };

    let stats = compute_stats(&records, today_count, offset);

    Ok(Json(VisitorsResponse {
        visitors: records,
        stats,
    }))
}

fn authorize(state: &router::State, headers: &HeaderMap) -> Result<(), TrackerError> {
    let Some(expected) = &state.dashboard_password else {
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided != Some(expected.as_str()) {
        return Err(TrackerError::Unauthorized);
    }
    Ok(())
}

fn parse_param(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or(default)
}

/// Statistics over the resolved page only, not the full history.
pub fn compute_stats(records: &[VisitorRecord], today: u64, offset: usize) -> VisitorStats {
    let unique_companies: HashSet<&str> = records
        .iter()
        .filter_map(|record| record.company.as_deref())
        .filter(|company| !company.is_empty())
        .collect();

    let mut company_counts: HashMap<String, u64> = HashMap::new();
    let mut country_counts: HashMap<String, u64> = HashMap::new();
    let mut referrer_counts: HashMap<String, u64> = HashMap::new();

    for record in records {
        if let Some(company) = record.company.as_deref().filter(|c| !c.is_empty()) {
            *company_counts.entry(company.to_string()).or_insert(0) += 1;
        }

        let country = record.country.as_deref().unwrap_or("Unknown");
        *country_counts.entry(country.to_string()).or_insert(0) += 1;

        *referrer_counts
            .entry(referrer_domain(&record.referrer))
            .or_insert(0) += 1;
    }

    VisitorStats {
        total: records.len().saturating_add(offset),
        today,
        unique_companies: unique_companies.len(),
        company_counts,
        country_counts,
        referrer_counts,
    }
}

/// Group key for a referrer: the URL host, `"Direct"` for an empty referrer,
/// or the first 30 characters of a string that is not a URL.
pub fn referrer_domain(referrer: &str) -> String {
    if referrer.is_empty() {
        return String::from("Direct");
    }

    Url::parse(referrer)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| referrer.chars().take(30).collect())
}

#[cfg(test)]
mod tests {
    use super::{compute_stats, parse_param, referrer_domain, DEFAULT_LIMIT, MAX_LIMIT};
    use crate::visitor::VisitorRecord;

    fn record(company: Option<&str>, country: Option<&str>, referrer: &str) -> VisitorRecord {
        VisitorRecord {
            ip: "1.2.3.4".to_string(),
            user_agent: "test".to_string(),
            referrer: referrer.to_string(),
            page: "/".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            company: company.map(String::from),
            country: country.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn referrer_grouping() {
        assert_eq!(
            referrer_domain("https://news.ycombinator.com/item?id=1"),
            "news.ycombinator.com"
        );
        assert_eq!(referrer_domain(""), "Direct");
        assert_eq!(referrer_domain("not a url"), "not a url");

        let long = "x".repeat(80);
        assert_eq!(referrer_domain(&long), "x".repeat(30));
    }

    #[test]
    fn limit_parsing_clamps_and_defaults() {
        assert_eq!(parse_param(Some("500"), DEFAULT_LIMIT).min(MAX_LIMIT), 100);
        assert_eq!(parse_param(Some("25"), DEFAULT_LIMIT).min(MAX_LIMIT), 25);
        assert_eq!(parse_param(Some("nope"), DEFAULT_LIMIT), 50);
        assert_eq!(parse_param(None, DEFAULT_LIMIT), 50);
    }

    #[test]
    fn stats_count_companies_countries_and_referrers() {
        let records = vec![
            record(Some("Stripe"), Some("US"), "https://stripe.com/jobs"),
            record(Some("Stripe"), Some("US"), ""),
            record(Some("Google"), Some("IE"), "https://news.ycombinator.com/"),
            record(None, None, "not a url"),
        ];

        let stats = compute_stats(&records, 7, 10);

        assert_eq!(stats.total, 14);
        assert_eq!(stats.today, 7);
        assert_eq!(stats.unique_companies, 2);
        assert_eq!(stats.company_counts["Stripe"], 2);
        assert_eq!(stats.company_counts["Google"], 1);
        assert_eq!(stats.country_counts["US"], 2);
        assert_eq!(stats.country_counts["Unknown"], 1);
        assert_eq!(stats.referrer_counts["stripe.com"], 1);
        assert_eq!(stats.referrer_counts["Direct"], 1);
        assert_eq!(stats.referrer_counts["not a url"], 1);
    }

    #[test]
    fn stats_over_empty_page_are_zero() {
        let stats = compute_stats(&[], 0, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.unique_companies, 0);
        assert!(stats.company_counts.is_empty());
    }
}
