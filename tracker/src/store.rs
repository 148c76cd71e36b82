use std::collections::HashMap;
use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::visitor::VisitorRecord;

pub const RECENT_VISITORS_KEY: &str = "recent_visitors";
pub const RECENT_VISITORS_MAX: usize = 1000;
const DAILY_KEY_PREFIX: &str = "visits";

/// The persistence surface the handlers rely on. The store owns all durable
/// state; handlers only hold transient copies of records.
#[async_trait]
pub trait VisitorStore {
    async fn set_record(&self, id: &str, record: &VisitorRecord) -> Result<()>;
    async fn push_recent(&self, id: &str) -> Result<()>;
    async fn trim_recent(&self, max_len: usize) -> Result<()>;
    async fn incr_daily(&self, date: &str) -> Result<u64>;
    async fn range_recent(&self, offset: usize, limit: usize) -> Result<Vec<String>>;
    /// `Ok(None)` covers both a missing key and a value that no longer
    /// parses; callers skip silently either way.
    async fn get_record(&self, id: &str) -> Result<Option<VisitorRecord>>;
    async fn daily_count(&self, date: &str) -> Result<u64>;
}

fn daily_key(date: &str) -> String {
    format!("{DAILY_KEY_PREFIX}:{date}")
}

#[derive(serde::Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
}

/// Client for a hosted key-value store speaking an Upstash-style REST
/// protocol: writes POST a JSON command array to the base URL, reads use
/// path segments. Both carry the bearer token.
pub struct RestStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RestStore {
    pub fn new(client: reqwest::Client, url: String, token: String) -> RestStore {
        let url = url.trim_end_matches('/').to_string();
        RestStore { client, url, token }
    }

    async fn command(&self, command: &[&str]) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?
            .error_for_status()?;

        let body: CommandResponse = response.json().await?;
        Ok(body.result)
    }

    async fn read(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/{}", self.url, path))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let body: CommandResponse = response.json().await?;
        Ok(body.result)
    }
}

#[async_trait]
impl VisitorStore for RestStore {
    async fn set_record(&self, id: &str, record: &VisitorRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.command(&["SET", id, &payload]).await?;
        Ok(())
    }

    async fn push_recent(&self, id: &str) -> Result<()> {
        self.command(&["LPUSH", RECENT_VISITORS_KEY, id]).await?;
        Ok(())
    }

    async fn trim_recent(&self, max_len: usize) -> Result<()> {
        let stop = max_len.saturating_sub(1).to_string();
        self.command(&["LTRIM", RECENT_VISITORS_KEY, "0", &stop])
            .await?;
        Ok(())
    }

    async fn incr_daily(&self, date: &str) -> Result<u64> {
        let result = self.command(&["INCR", &daily_key(date)]).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    async fn range_recent(&self, offset: usize, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = range_stop(offset, limit);
        let result = self
            .read(&format!("lrange/{RECENT_VISITORS_KEY}/{offset}/{stop}"))
            .await?;

        let ids = result
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn get_record(&self, id: &str) -> Result<Option<VisitorRecord>> {
        let result = self.read(&format!("get/{id}")).await?;
        Ok(parse_record(&result))
    }

    async fn daily_count(&self, date: &str) -> Result<u64> {
        let result = self.read(&format!("get/{}", daily_key(date))).await?;
        let count = match &result {
            Value::String(raw) => raw.parse().unwrap_or(0),
            Value::Number(n) => n.as_u64().unwrap_or(0),
            _ => 0,
        };
        Ok(count)
    }
}

/// Inclusive stop index for a range read. Saturates so a degenerate offset
/// from the query string yields an empty page instead of overflowing.
fn range_stop(offset: usize, limit: usize) -> usize {
    offset.saturating_add(limit).saturating_sub(1)
}

fn parse_record(value: &Value) -> Option<VisitorRecord> {
    match value {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<String, String>,
    recent: VecDeque<String>,
    counters: HashMap<String, u64>,
}

/// In-process store with the same trim/range semantics as the remote one.
/// Backs the tests, and is handy as a dev store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Insert a raw value under a record key, bypassing serialization.
    /// Lets tests stage entries that fail to parse.
    pub async fn set_raw(&self, id: &str, raw: &str) {
        let mut inner = self.inner.lock().await;
        inner.records.insert(id.to_string(), raw.to_string());
    }

    pub async fn recent_len(&self) -> usize {
        self.inner.lock().await.recent.len()
    }
}

#[async_trait]
impl VisitorStore for MemoryStore {
    async fn set_record(&self, id: &str, record: &VisitorRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut inner = self.inner.lock().await;
        inner.records.insert(id.to_string(), payload);
        Ok(())
    }

    async fn push_recent(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.recent.push_front(id.to_string());
        Ok(())
    }

    async fn trim_recent(&self, max_len: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.recent.truncate(max_len);
        Ok(())
    }

    async fn incr_daily(&self, date: &str) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(daily_key(date)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn range_recent(&self, offset: usize, limit: usize) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .recent
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_record(&self, id: &str) -> Result<Option<VisitorRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .get(id)
            .and_then(|raw| serde_json::from_str(raw).ok()))
    }

    async fn daily_count(&self, date: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.counters.get(&daily_key(date)).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_record, range_stop, MemoryStore, VisitorStore, RECENT_VISITORS_MAX};
    use crate::visitor::VisitorRecord;

    fn record(ip: &str) -> VisitorRecord {
        VisitorRecord {
            ip: ip.to_string(),
            user_agent: "test".to_string(),
            page: "/".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn trim_keeps_newest_thousand() {
        let store = MemoryStore::new();
        for i in 0..1500 {
            store.push_recent(&format!("visitor:{i}")).await.unwrap();
            store.trim_recent(RECENT_VISITORS_MAX).await.unwrap();
        }

        assert_eq!(store.recent_len().await, 1000);
        let newest = store.range_recent(0, 2).await.unwrap();
        assert_eq!(newest, vec!["visitor:1499", "visitor:1498"]);
        let oldest = store.range_recent(999, 5).await.unwrap();
        assert_eq!(oldest, vec!["visitor:500"]);
    }

    #[tokio::test]
    async fn range_honors_offset_and_limit() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.push_recent(&format!("v{i}")).await.unwrap();
        }

        let page = store.range_recent(2, 3).await.unwrap();
        assert_eq!(page, vec!["v7", "v6", "v5"]);
        assert!(store.range_recent(10, 3).await.unwrap().is_empty());
        assert!(store.range_recent(usize::MAX, 100).await.unwrap().is_empty());
    }

    #[test]
    fn range_stop_saturates_on_degenerate_offsets() {
        assert_eq!(range_stop(0, 50), 49);
        assert_eq!(range_stop(20, 10), 29);
        assert_eq!(range_stop(usize::MAX, 100), usize::MAX);
        assert_eq!(range_stop(usize::MAX - 10, 100), usize::MAX);
    }

    #[tokio::test]
    async fn get_record_round_trips() {
        let store = MemoryStore::new();
        store.set_record("id", &record("1.2.3.4")).await.unwrap();

        let fetched = store.get_record("id").await.unwrap().unwrap();
        assert_eq!(fetched.ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn absent_or_garbled_records_are_none() {
        let store = MemoryStore::new();
        assert!(store.get_record("missing").await.unwrap().is_none());

        store.set_raw("garbled", "{not json").await;
        assert!(store.get_record("garbled").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn daily_counter_increments_per_visit() {
        let store = MemoryStore::new();
        assert_eq!(store.daily_count("2024-01-01").await.unwrap(), 0);
        assert_eq!(store.incr_daily("2024-01-01").await.unwrap(), 1);
        assert_eq!(store.incr_daily("2024-01-01").await.unwrap(), 2);
        assert_eq!(store.incr_daily("2024-01-02").await.unwrap(), 1);
        assert_eq!(store.daily_count("2024-01-01").await.unwrap(), 2);
    }

    #[test]
    fn parse_record_accepts_string_and_object_results() {
        let as_string = json!(serde_json::to_string(&record("1.1.1.1")).unwrap());
        assert!(parse_record(&as_string).is_some());

        let as_object = serde_json::to_value(record("1.1.1.1")).unwrap();
        assert!(parse_record(&as_object).is_some());

        assert!(parse_record(&json!(null)).is_none());
        assert!(parse_record(&json!("{broken")).is_none());
    }
}
