use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::enrichment::{patterns, CompanySource, GeoInfo, GeoSource, HostnameSource, RevealCompany};

pub const REVEAL_CONFIDENCE: f64 = 0.95;
pub const PATTERN_CONFIDENCE: f64 = 0.7;
pub const RDNS_CONFIDENCE: f64 = 0.6;
pub const ORG_NAME_CONFIDENCE: f64 = 0.4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributionSource {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "reveal")]
    Reveal,
    #[serde(rename = "pattern-match")]
    PatternMatch,
    #[serde(rename = "org-name")]
    OrgName,
    #[serde(rename = "rdns")]
    ReverseDns,
}

/// The finalized answer for one IP. Never persisted on its own; ingestion
/// folds it into a `VisitorRecord`, the standalone lookup returns it as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub confidence: f64,
    pub source: AttributionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// A company attribution proposed by one source, before the merge.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub domain: Option<String>,
    pub confidence: f64,
    pub source: AttributionSource,
}

/// Drives the enrichment sources for a single IP and merges their answers.
///
/// Sources missing a credential are simply absent; a fully unconfigured
/// engine resolves every IP to a zero-confidence result. The engine only
/// knows the source traits, so tests can install fakes.
pub struct AttributionEngine {
    geo: Option<Box<dyn GeoSource + Send + Sync>>,
    reveal: Option<Box<dyn CompanySource + Send + Sync>>,
    rdns: Option<Box<dyn HostnameSource + Send + Sync>>,
}

impl AttributionEngine {
    pub fn new(
        geo: Option<Box<dyn GeoSource + Send + Sync>>,
        reveal: Option<Box<dyn CompanySource + Send + Sync>>,
        rdns: Option<Box<dyn HostnameSource + Send + Sync>>,
    ) -> AttributionEngine {
        AttributionEngine { geo, reveal, rdns }
    }

    pub async fn resolve(&self, ip: &str) -> AttributionResult {
        let mut result = AttributionResult::default();

        // Independent reads, but the merge below is applied in fixed
        // priority order regardless of which call finishes first.
        let (geo, reveal) = tokio::join!(self.lookup_geo(ip), self.lookup_reveal(ip));

        if let Some(geo) = &geo {
            result.country = geo.country.clone();
            result.city = geo.city.clone();
            result.region = geo.region.clone();
            result.org = geo.org.clone();
        }

        if let Some(company) = reveal {
            merge(
                &mut result,
                Candidate {
                    name: company.name,
                    domain: company.domain,
                    confidence: REVEAL_CONFIDENCE,
                    source: AttributionSource::Reveal,
                },
            );
        }

        if let Some(candidate) = geo.and_then(|geo| geo.org.as_deref().and_then(org_candidate)) {
            merge(&mut result, candidate);
        }

        // Reverse DNS is a fallback only; skip the lookup entirely once a
        // confident source has answered.
        if result.confidence < RDNS_CONFIDENCE {
            if let Some(hostname) = self.lookup_rdns(ip).await {
                if let Some(name) = patterns::match_company(&hostname) {
                    merge(
                        &mut result,
                        Candidate {
                            name: name.to_string(),
                            domain: None,
                            confidence: RDNS_CONFIDENCE,
                            source: AttributionSource::ReverseDns,
                        },
                    );
                }
            }
        }

        result
    }

    async fn lookup_geo(&self, ip: &str) -> Option<GeoInfo> {
        let client = self.geo.as_ref()?;
        match client.lookup(ip).await {
            Ok(info) => Some(info),
            Err(err) => {
                counter!("tracker_enrichment_failures_total", "source" => "geo").increment(1);
                tracing::warn!("geo lookup failed for {}: {:#}", ip, err);
                None
            }
        }
    }

    async fn lookup_reveal(&self, ip: &str) -> Option<RevealCompany> {
        let client = self.reveal.as_ref()?;
        match client.lookup(ip).await {
            Ok(company) => company,
            Err(err) => {
                counter!("tracker_enrichment_failures_total", "source" => "reveal").increment(1);
                tracing::warn!("reveal lookup failed for {}: {:#}", ip, err);
                None
            }
        }
    }

    async fn lookup_rdns(&self, ip: &str) -> Option<String> {
        let client = self.rdns.as_ref()?;
        match client.lookup(ip).await {
            Ok(hostname) => hostname,
            Err(err) => {
                counter!("tracker_enrichment_failures_total", "source" => "rdns").increment(1);
                tracing::warn!("rdns lookup failed for {}: {:#}", ip, err);
                None
            }
        }
    }
}

/// A candidate wins only with strictly greater confidence, so a held
/// attribution is never downgraded by a weaker source.
pub fn merge(result: &mut AttributionResult, candidate: Candidate) {
    if candidate.confidence > result.confidence {
        result.name = Some(candidate.name);
        result.domain = candidate.domain;
        result.confidence = candidate.confidence;
        result.source = candidate.source;
    }
}

static ASN_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^AS\d+\s+").expect("ASN prefix pattern must compile"));

/// Derive a company candidate from a raw network-owner string: a table match
/// at 0.7, else the ASN-stripped org name at 0.4. Carrier-looking orgs
/// (`ISP`, `Telecom`) produce nothing.
pub fn org_candidate(org: &str) -> Option<Candidate> {
    if let Some(name) = patterns::match_company(org) {
        return Some(Candidate {
            name: name.to_string(),
            domain: None,
            confidence: PATTERN_CONFIDENCE,
            source: AttributionSource::PatternMatch,
        });
    }

    if org.contains("ISP") || org.contains("Telecom") {
        return None;
    }

    let name = ASN_PREFIX.replace(org, "").trim().to_string();
    if name.is_empty() {
        return None;
    }

    Some(Candidate {
        name,
        domain: None,
        confidence: ORG_NAME_CONFIDENCE,
        source: AttributionSource::OrgName,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::{
        merge, org_candidate, AttributionEngine, AttributionResult, AttributionSource, Candidate,
        ORG_NAME_CONFIDENCE, PATTERN_CONFIDENCE, RDNS_CONFIDENCE, REVEAL_CONFIDENCE,
    };
    use crate::enrichment::{CompanySource, GeoInfo, GeoSource, HostnameSource, RevealCompany};

    struct StaticGeo(GeoInfo);

    #[async_trait]
    impl GeoSource for StaticGeo {
        async fn lookup(&self, _ip: &str) -> Result<GeoInfo> {
            Ok(self.0.clone())
        }
    }

    struct StaticReveal(Option<RevealCompany>);

    #[async_trait]
    impl CompanySource for StaticReveal {
        async fn lookup(&self, _ip: &str) -> Result<Option<RevealCompany>> {
            Ok(self.0.clone())
        }
    }

    struct StaticHostname {
        hostname: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HostnameSource for StaticHostname {
        async fn lookup(&self, _ip: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hostname.clone())
        }
    }

    struct FailingGeo;

    #[async_trait]
    impl GeoSource for FailingGeo {
        async fn lookup(&self, _ip: &str) -> Result<GeoInfo> {
            Err(anyhow::anyhow!("upstream returned 502"))
        }
    }

    fn geo_with_org(org: &str) -> Option<Box<dyn GeoSource + Send + Sync>> {
        Some(Box::new(StaticGeo(GeoInfo {
            country: Some("US".to_string()),
            city: Some("Mountain View".to_string()),
            region: Some("California".to_string()),
            org: Some(org.to_string()),
        })))
    }

    fn candidate(name: &str, confidence: f64, source: AttributionSource) -> Candidate {
        Candidate {
            name: name.to_string(),
            domain: None,
            confidence,
            source,
        }
    }

    #[test]
    fn merge_keeps_strongest_regardless_of_order() {
        let weak = candidate("Comcast", 0.4, AttributionSource::OrgName);
        let strong = candidate("Stripe", 0.9, AttributionSource::Reveal);

        let mut forward = AttributionResult::default();
        merge(&mut forward, weak.clone());
        merge(&mut forward, strong.clone());

        let mut reverse = AttributionResult::default();
        merge(&mut reverse, strong);
        merge(&mut reverse, weak);

        assert_eq!(forward.name.as_deref(), Some("Stripe"));
        assert_eq!(reverse.name.as_deref(), Some("Stripe"));
        assert_eq!(forward.confidence, 0.9);
        assert_eq!(reverse.confidence, 0.9);
    }

    #[test]
    fn merge_requires_strictly_greater_confidence() {
        let mut result = AttributionResult::default();
        merge(&mut result, candidate("First", 0.6, AttributionSource::ReverseDns));
        merge(&mut result, candidate("Second", 0.6, AttributionSource::ReverseDns));

        assert_eq!(result.name.as_deref(), Some("First"));
    }

    #[test]
    fn org_candidate_prefers_pattern_table() {
        let candidate = org_candidate("AS15169 Google LLC").unwrap();
        assert_eq!(candidate.name, "Google");
        assert_eq!(candidate.confidence, PATTERN_CONFIDENCE);
        assert_eq!(candidate.source, AttributionSource::PatternMatch);
    }

    #[test]
    fn org_candidate_strips_asn_prefix() {
        let candidate = org_candidate("AS54113 Fastly, Inc.").unwrap();
        assert_eq!(candidate.name, "Fastly, Inc.");
        assert_eq!(candidate.confidence, ORG_NAME_CONFIDENCE);
        assert_eq!(candidate.source, AttributionSource::OrgName);
    }

    #[test]
    fn org_candidate_skips_carriers() {
        assert_eq!(org_candidate("AS1234 Example ISP"), None);
        assert_eq!(org_candidate("British Telecom"), None);
    }

    #[test]
    fn org_candidate_skips_empty_remainder() {
        assert_eq!(org_candidate("AS1234 "), None);
    }

    #[tokio::test]
    async fn unconfigured_engine_resolves_to_zero_confidence() {
        let engine = AttributionEngine::new(None, None, None);
        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.source, AttributionSource::None);
        assert_eq!(result.name, None);
        assert_eq!(result.country, None);
    }

    #[test]
    fn reveal_outranks_every_heuristic() {
        assert!(REVEAL_CONFIDENCE > PATTERN_CONFIDENCE);
        assert!(PATTERN_CONFIDENCE > ORG_NAME_CONFIDENCE);
    }

    #[tokio::test]
    async fn resolve_prefers_reveal_over_org_heuristics() {
        let reveal: Option<Box<dyn CompanySource + Send + Sync>> =
            Some(Box::new(StaticReveal(Some(RevealCompany {
                name: "Stripe".to_string(),
                domain: Some("stripe.com".to_string()),
            }))));
        let engine = AttributionEngine::new(geo_with_org("AS15169 Google LLC"), reveal, None);

        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(result.name.as_deref(), Some("Stripe"));
        assert_eq!(result.domain.as_deref(), Some("stripe.com"));
        assert_eq!(result.confidence, REVEAL_CONFIDENCE);
        assert_eq!(result.source, AttributionSource::Reveal);
        // Geography still comes from the geo source even when reveal wins.
        assert_eq!(result.country.as_deref(), Some("US"));
        assert_eq!(result.org.as_deref(), Some("AS15169 Google LLC"));
    }

    #[tokio::test]
    async fn resolve_matches_org_against_pattern_table() {
        let engine = AttributionEngine::new(geo_with_org("AS15169 Google LLC"), None, None);

        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(result.name.as_deref(), Some("Google"));
        assert_eq!(result.confidence, PATTERN_CONFIDENCE);
        assert_eq!(result.source, AttributionSource::PatternMatch);
    }

    #[tokio::test]
    async fn resolve_skips_rdns_once_confident() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rdns: Option<Box<dyn HostnameSource + Send + Sync>> = Some(Box::new(StaticHostname {
            hostname: Some("crawl.googlebot.com".to_string()),
            calls: calls.clone(),
        }));
        let engine = AttributionEngine::new(geo_with_org("AS15169 Google LLC"), None, rdns);

        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(result.source, AttributionSource::PatternMatch);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_rdns_below_threshold() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rdns: Option<Box<dyn HostnameSource + Send + Sync>> = Some(Box::new(StaticHostname {
            hostname: Some("ec2-3-80-1-1.amazonaws.com".to_string()),
            calls: calls.clone(),
        }));
        // An unrecognized org only reaches 0.4, leaving rdns in play.
        let engine = AttributionEngine::new(geo_with_org("AS64496 Acme Hosting"), None, rdns);

        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.name.as_deref(), Some("Amazon"));
        assert_eq!(result.confidence, RDNS_CONFIDENCE);
        assert_eq!(result.source, AttributionSource::ReverseDns);
    }

    #[tokio::test]
    async fn resolve_absorbs_source_failures() {
        let geo: Option<Box<dyn GeoSource + Send + Sync>> = Some(Box::new(FailingGeo));
        let engine = AttributionEngine::new(geo, None, None);

        let result = engine.resolve("203.0.113.9").await;

        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.source, AttributionSource::None);
        assert_eq!(result.country, None);
    }
}
