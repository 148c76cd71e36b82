use std::net::SocketAddr;

use envconfig::Envconfig;

/// Every collaborator is optional: a missing credential disables that
/// collaborator without failing requests that would have used it.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    pub kv_rest_api_url: Option<String>,
    pub kv_rest_api_token: Option<String>,

    pub ipinfo_token: Option<String>,
    #[envconfig(default = "https://ipinfo.io")]
    pub ipinfo_endpoint: String,

    pub clearbit_key: Option<String>,
    #[envconfig(default = "https://reveal.clearbit.com")]
    pub clearbit_endpoint: String,

    #[envconfig(default = "true")]
    pub rdns_enabled: bool,
    #[envconfig(default = "https://dns.google")]
    pub rdns_endpoint: String,

    pub resend_api_key: Option<String>,
    pub notify_email: Option<String>,
    #[envconfig(default = "Portfolio Analytics <analytics@localhost>")]
    pub notify_from: String,
    pub notify_secret: Option<String>,

    pub dashboard_password: Option<String>,
    #[envconfig(default = "https://api.resend.com/emails")]
    pub resend_endpoint: String,

    #[envconfig(default = "10")]
    pub request_timeout_seconds: u64,
    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}
