//! Clients for the external services consulted about a visiting IP.
//!
//! Each client wraps one HTTP API and normalizes its response; whether a
//! lookup contributes to an attribution is decided by the engine in
//! `crate::attribution`. The engine only sees the source traits below, so
//! tests can stand in fake sources the same way the store has its
//! in-memory double. Every client is constructed only when its credential
//! is configured.

use anyhow::Result;
use async_trait::async_trait;

pub mod geo;
pub mod patterns;
pub mod rdns;
pub mod reveal;

pub use geo::{GeoClient, GeoInfo};
pub use rdns::RdnsClient;
pub use reveal::{RevealClient, RevealCompany};

/// Geography and network-owner lookup for an IP.
#[async_trait]
pub trait GeoSource {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo>;
}

/// Direct company identification; `Ok(None)` when the source answered but
/// could not attribute the IP.
#[async_trait]
pub trait CompanySource {
    async fn lookup(&self, ip: &str) -> Result<Option<RevealCompany>>;
}

/// Reverse hostname lookup for an IP.
#[async_trait]
pub trait HostnameSource {
    async fn lookup(&self, ip: &str) -> Result<Option<String>>;
}
