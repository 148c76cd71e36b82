use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::GeoSource;

/// Geography and network-owner data for one IP, as returned by an
/// ipinfo-style lookup (`GET {endpoint}/{ip}?token=...`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub org: Option<String>,
}

pub struct GeoClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GeoClient {
    pub fn new(client: reqwest::Client, endpoint: String, token: String) -> GeoClient {
        GeoClient {
            client,
            endpoint,
            token,
        }
    }
}

#[async_trait]
impl GeoSource for GeoClient {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = self
            .client
            .get(url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}
