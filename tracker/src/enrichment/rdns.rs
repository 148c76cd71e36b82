use std::net::Ipv4Addr;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::HostnameSource;

#[derive(Deserialize)]
struct DnsAnswer {
    data: String,
}

#[derive(Deserialize)]
struct DnsResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsAnswer>,
}

/// Pointer-record lookup through a public DNS-over-HTTPS resolver. Needs no
/// credential, so it stays available even with every paid source disabled.
pub struct RdnsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RdnsClient {
    pub fn new(client: reqwest::Client, endpoint: String) -> RdnsClient {
        RdnsClient { client, endpoint }
    }
}

#[async_trait]
impl HostnameSource for RdnsClient {
    /// Resolve the PTR hostname for an IPv4 address. Anything that is not an
    /// IPv4 address (including the `"unknown"` sentinel) yields `Ok(None)`
    /// without a network call.
    async fn lookup(&self, ip: &str) -> Result<Option<String>> {
        let Ok(addr) = ip.parse::<Ipv4Addr>() else {
            return Ok(None);
        };

        let name = ptr_name(addr);
        let url = format!("{}/resolve", self.endpoint);
        let response = self
            .client
            .get(url)
            .query(&[("name", name.as_str()), ("type", "PTR")])
            .send()
            .await?
            .error_for_status()?;

        let body: DnsResponse = response.json().await?;
        Ok(body.answer.into_iter().next().map(|answer| answer.data))
    }
}

fn ptr_name(addr: Ipv4Addr) -> String {
    let [a, b, c, d] = addr.octets();
    format!("{d}.{c}.{b}.{a}.in-addr.arpa")
}

#[cfg(test)]
mod tests {
    use super::ptr_name;

    #[test]
    fn ptr_name_reverses_octets() {
        assert_eq!(
            ptr_name("8.8.8.4".parse().unwrap()),
            "4.8.8.8.in-addr.arpa"
        );
    }
}
