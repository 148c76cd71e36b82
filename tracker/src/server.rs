use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::attribution::AttributionEngine;
use crate::config::Config;
use crate::enrichment::{
    CompanySource, GeoClient, GeoSource, HostnameSource, RdnsClient, RevealClient,
};
use crate::notify::Notifier;
use crate::router;
use crate::store::{RestStore, VisitorStore};

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let client = reqwest::Client::builder()
        .user_agent("portfolio-tracker")
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
        .expect("failed to construct http client");

    let geo: Option<Box<dyn GeoSource + Send + Sync>> = config.ipinfo_token.clone().map(|token| {
        let client: Box<dyn GeoSource + Send + Sync> = Box::new(GeoClient::new(
            client.clone(),
            config.ipinfo_endpoint.clone(),
            token,
        ));
        client
    });
    let reveal: Option<Box<dyn CompanySource + Send + Sync>> =
        config.clearbit_key.clone().map(|key| {
            let client: Box<dyn CompanySource + Send + Sync> = Box::new(RevealClient::new(
                client.clone(),
                config.clearbit_endpoint.clone(),
                key,
            ));
            client
        });
    let rdns: Option<Box<dyn HostnameSource + Send + Sync>> = config.rdns_enabled.then(|| {
        let client: Box<dyn HostnameSource + Send + Sync> =
            Box::new(RdnsClient::new(client.clone(), config.rdns_endpoint.clone()));
        client
    });
    let attribution = AttributionEngine::new(geo, reveal, rdns);

    let store: Option<Arc<dyn VisitorStore + Send + Sync>> =
        match (&config.kv_rest_api_url, &config.kv_rest_api_token) {
            (Some(url), Some(token)) => Some(Arc::new(RestStore::new(
                client.clone(),
                url.clone(),
                token.clone(),
            ))),
            _ => {
                tracing::warn!("visitor store not configured, tracking writes are disabled");
                None
            }
        };

    let notifier = match (&config.resend_api_key, &config.notify_email) {
        (Some(key), Some(to)) => Some(Notifier::new(
            client,
            config.resend_endpoint.clone(),
            key.clone(),
            config.notify_from.clone(),
            to.clone(),
        )),
        _ => None,
    };

    let app = router::router(
        crate::time::SystemTime {},
        attribution,
        store,
        notifier,
        config.dashboard_password.clone(),
        config.notify_secret.clone(),
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .unwrap()
}
