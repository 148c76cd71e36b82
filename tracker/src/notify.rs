use std::collections::HashMap;

use anyhow::Result;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::{NotifyResponse, TrackerError};
use crate::router;
use crate::visitor::VisitorRecord;

pub const NOTIFY_SECRET_HEADER: &str = "x-notify-secret";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    fn emoji(self) -> &'static str {
        match self {
            Priority::Low => "",
            Priority::Normal => "📧",
            Priority::High => "🚨",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub metadata: Option<HashMap<String, String>>,
}

/// Transactional-email client. Only constructed when both the API key and a
/// recipient are configured.
pub struct Notifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    to: String,
}

impl Notifier {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: String,
        from: String,
        to: String,
    ) -> Notifier {
        Notifier {
            client,
            endpoint,
            api_key,
            from,
            to,
        }
    }

    /// Ingestion-side alert summarizing one visit.
    pub async fn visitor_alert(&self, record: &VisitorRecord) -> Result<()> {
        let subject = format!(
            "🔔 Portfolio Visitor: {}",
            record.company.as_deref().unwrap_or("Notable Visit")
        );

        let location = format!(
            "{}, {}",
            record.city.as_deref().unwrap_or(""),
            record.country.as_deref().unwrap_or("Unknown")
        );
        let referrer = if record.referrer.is_empty() {
            "Direct"
        } else {
            record.referrer.as_str()
        };
        let confidence = format!("{}%", (record.company_confidence * 100.0).round());

        let rows = [
            ("Company", record.company.as_deref().unwrap_or("Unknown")),
            ("Location", location.as_str()),
            ("Referrer", referrer),
            ("Page", record.page.as_str()),
            ("Time", record.timestamp.as_str()),
            ("Confidence", confidence.as_str()),
        ];
        let html = format!("<h2>New Portfolio Visitor</h2>{}", table(&rows));

        self.send(&subject, &html).await
    }

    /// Dispatch a notification posted to the internal endpoint.
    pub async fn dispatch(&self, subject: &str, body: &str, payload: &NotificationPayload) -> Result<()> {
        let decorated = format!("{} [{}] {}", payload.priority.emoji(), payload.kind, subject);

        let metadata = payload
            .metadata
            .as_ref()
            .filter(|metadata| !metadata.is_empty())
            .map(|metadata| {
                let rows: Vec<(&str, &str)> = metadata
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                format!("<h3>Details</h3>{}", table(&rows))
            })
            .unwrap_or_default();

        let html = format!(
            "<h2>{}</h2><p>{}</p>{}",
            subject,
            body.replace('\n', "<br>"),
            metadata
        );

        self.send(&decorated, &html).await
    }

    async fn send(&self, subject: &str, html: &str) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": self.to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

fn table(rows: &[(&str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(key, value)| format!("<tr><td><strong>{key}</strong></td><td>{value}</td></tr>"))
        .collect();
    format!("<table>{body}</table>")
}

pub async fn notify(
    State(state): State<router::State>,
    headers: HeaderMap,
    Json(payload): Json<NotificationPayload>,
) -> Result<Json<NotifyResponse>, TrackerError> {
    let provided = headers
        .get(NOTIFY_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != state.notify_secret.as_deref() {
        return Err(TrackerError::Unauthorized);
    }

    let subject = payload.subject.as_deref().filter(|s| !s.is_empty());
    let body = payload.body.as_deref().filter(|b| !b.is_empty());
    let (Some(subject), Some(body)) = (subject, body) else {
        return Err(TrackerError::MissingNotificationFields);
    };

    let Some(notifier) = &state.notifier else {
        return Ok(Json(NotifyResponse {
            success: false,
            reason: Some("email not configured".to_string()),
        }));
    };

    notifier.dispatch(subject, body, &payload).await?;

    Ok(Json(NotifyResponse {
        success: true,
        reason: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::{Priority, table};

    #[test]
    fn priority_decorations() {
        assert_eq!(Priority::Low.emoji(), "");
        assert_eq!(Priority::Normal.emoji(), "📧");
        assert_eq!(Priority::High.emoji(), "🚨");
    }

    #[test]
    fn table_renders_rows() {
        let html = table(&[("Company", "Stripe")]);
        assert!(html.contains("<strong>Company</strong>"));
        assert!(html.contains("<td>Stripe</td>"));
    }
}
