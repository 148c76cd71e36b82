use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use axum_client_ip::InsecureClientIp;
use metrics::counter;
use tracing::instrument;

use crate::api::{TrackResponse, TrackerError};
use crate::router;
use crate::store::{VisitorStore, RECENT_VISITORS_MAX};
use crate::time;
use crate::visitor::{record_key, TrackPayload, VisitorRecord};

/// Ingest one page-view. Tracking is best-effort: enrichment, persistence
/// and notification failures are absorbed and the visitor-facing response
/// is a success either way.
#[instrument(skip_all, fields(ip, page))]
pub async fn track(
    State(state): State<router::State>,
    client_ip: Option<InsecureClientIp>,
    headers: HeaderMap,
    Json(payload): Json<TrackPayload>,
) -> Result<Json<TrackResponse>, TrackerError> {
    let ip = client_ip
        .map(|InsecureClientIp(addr)| addr.to_string())
        .unwrap_or_else(|| String::from("unknown"));

    let user_agent = headers
        .get("user-agent")
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"))
        .to_string();
    let referrer = payload
        .referrer
        .filter(|referrer| !referrer.is_empty())
        .or_else(|| {
            headers
                .get("referer")
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_default();
    let page = payload
        .page
        .filter(|page| !page.is_empty())
        .unwrap_or_else(|| String::from("/"));

    tracing::Span::current().record("ip", ip.as_str());
    tracing::Span::current().record("page", page.as_str());

    let attribution = state.attribution.resolve(&ip).await;
    let now = state.timesource.now();

    let record = VisitorRecord {
        ip,
        user_agent,
        referrer,
        page,
        timestamp: time::iso8601(now),
        country: attribution.country,
        city: attribution.city,
        org: attribution.org,
        company: attribution.name,
        company_domain: attribution.domain,
        company_confidence: attribution.confidence,
    };

    counter!("tracker_visits_ingested_total").increment(1);
    tracing::debug!(record = ?record, "ingested visit");

    if let Some(store) = &state.store {
        let key = record_key(time::unix_millis(now), &record.ip);
        let date = time::daily_key(now);

        // Deliberately discarded: a store outage must not fail the request.
        let persisted = persist_visit(store.as_ref(), &key, &record, &date).await;
        if let Err(err) = persisted {
            counter!("tracker_store_writes_dropped_total").increment(1);
            tracing::warn!("failed to persist visit: {:#}", err);
        }
    }

    if let Some(notifier) = &state.notifier {
        if let Err(err) = notifier.visitor_alert(&record).await {
            counter!("tracker_notifications_dropped_total").increment(1);
            tracing::warn!("failed to send visitor alert: {:#}", err);
        }
    }

    Ok(Json(TrackResponse { success: true }))
}

async fn persist_visit(
    store: &(dyn VisitorStore + Send + Sync),
    key: &str,
    record: &VisitorRecord,
    date: &str,
) -> anyhow::Result<()> {
    store.set_record(key, record).await?;
    store.push_recent(key).await?;
    store.trim_recent(RECENT_VISITORS_MAX).await?;
    store.incr_daily(date).await?;
    Ok(())
}
