use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::attribution::AttributionEngine;
use crate::notify::Notifier;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::VisitorStore;
use crate::time::TimeSource;
use crate::{company, notify, track, visitors};

#[derive(Clone)]
pub struct State {
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub attribution: Arc<AttributionEngine>,
    pub store: Option<Arc<dyn VisitorStore + Send + Sync>>,
    pub notifier: Option<Arc<Notifier>>,
    pub dashboard_password: Option<String>,
    pub notify_secret: Option<String>,
}

async fn index() -> &'static str {
    "tracker"
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    attribution: AttributionEngine,
    store: Option<Arc<dyn VisitorStore + Send + Sync>>,
    notifier: Option<Notifier>,
    dashboard_password: Option<String>,
    notify_secret: Option<String>,
    metrics: bool,
) -> Router {
    let state = State {
        timesource: Arc::new(timesource),
        attribution: Arc::new(attribution),
        store,
        notifier: notifier.map(Arc::new),
        dashboard_password,
        notify_secret,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/api/analytics/track", post(track::track))
        .route("/api/analytics/visitors", get(visitors::visitors))
        .route("/api/company-detect", post(company::company_detect))
        .route("/api/notify", post(notify::notify))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the crate is used as a library
    // (during tests etc) does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
