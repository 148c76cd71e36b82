use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::CompanySource;

/// A company identified by the commercial reveal API. When present it is
/// authoritative for both name and domain.
#[derive(Debug, Clone, Deserialize)]
pub struct RevealCompany {
    pub name: String,
    pub domain: Option<String>,
}

#[derive(Deserialize)]
struct RevealResponse {
    company: Option<RevealCompany>,
}

pub struct RevealClient {
    client: reqwest::Client,
    endpoint: String,
    key: String,
}

impl RevealClient {
    pub fn new(client: reqwest::Client, endpoint: String, key: String) -> RevealClient {
        RevealClient {
            client,
            endpoint,
            key,
        }
    }
}

#[async_trait]
impl CompanySource for RevealClient {
    async fn lookup(&self, ip: &str) -> Result<Option<RevealCompany>> {
        let url = format!("{}/v1/companies/find", self.endpoint);
        let response = self
            .client
            .get(url)
            .query(&[("ip", ip)])
            .bearer_auth(&self.key)
            .send()
            .await?
            .error_for_status()?;

        let body: RevealResponse = response.json().await?;
        Ok(body.company)
    }
}
