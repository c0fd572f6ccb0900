//! Rotating pool of browser client identities.
//!
//! Each identity owns a pre-built HTTP client carrying its headers. Requests
//! pick identities round-robin from a shared cursor, skipping identities that
//! are cooling down after a block unless every identity is cooling.

use crate::error::{SourceError, SourceResult};
use crate::http;
use cawatch_telemetry::Metrics;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default cool-down after a block.
pub const DEFAULT_BLOCK_COOLDOWN: Duration = Duration::from_secs(60);

/// Browser identity attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub id: String,
    pub user_agent: String,
    pub sec_ch_ua: Option<String>,
    pub platform: String,
    pub accept_language: String,
}

impl Fingerprint {
    fn chrome(version: u32, platform: &str, os: &str) -> Self {
        Self {
            id: format!("chrome{version}"),
            user_agent: format!(
                "Mozilla/5.0 ({os}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
            ),
            sec_ch_ua: Some(format!(
                "\"Chromium\";v=\"{version}\", \"Google Chrome\";v=\"{version}\", \"Not-A.Brand\";v=\"99\""
            )),
            platform: format!("\"{platform}\""),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }

    fn safari(version: &str) -> Self {
        Self {
            id: format!("safari{}", version.replace('.', "_")),
            user_agent: format!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Safari/605.1.15"
            ),
            sec_ch_ua: None,
            platform: "\"macOS\"".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }

    /// Built-in identities in rotation order.
    pub fn defaults() -> Vec<Fingerprint> {
        vec![
            Self::chrome(110, "Windows", "Windows NT 10.0; Win64; x64"),
            Self::chrome(120, "macOS", "Macintosh; Intel Mac OS X 10_15_7"),
            Self::chrome(116, "Linux", "X11; Linux x86_64"),
            Self::safari("15.3"),
            Self::safari("15.5"),
        ]
    }

    fn headers(&self, extra: &[(String, String)]) -> SourceResult<HeaderMap> {
        let mut map = HeaderMap::new();
        let mut insert = |name: &str, value: &str| -> SourceResult<()> {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::HttpClient(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::HttpClient(format!("invalid header value for {name}: {e}")))?;
            map.insert(name, value);
            Ok(())
        };
        insert("user-agent", &self.user_agent)?;
        insert("accept", "application/json, text/plain, */*")?;
        insert("accept-language", &self.accept_language)?;
        insert("sec-ch-ua-platform", &self.platform)?;
        insert("sec-ch-ua-mobile", "?0")?;
        if let Some(ua) = &self.sec_ch_ua {
            insert("sec-ch-ua", ua)?;
        }
        for (name, value) in extra {
            insert(name, value)?;
        }
        Ok(map)
    }
}

struct Slot {
    fingerprint: Fingerprint,
    client: Client,
    blocked_until: Mutex<Option<Instant>>,
}

/// Identity chosen for one request.
pub struct Lease<'a> {
    pub index: usize,
    pub fingerprint: &'a Fingerprint,
    pub client: &'a Client,
}

/// Round-robin identity pool for one source.
pub struct FingerprintPool {
    source: String,
    slots: Vec<Slot>,
    cursor: AtomicUsize,
    cooldown: Duration,
}

impl FingerprintPool {
    /// Build one client per identity with `extra` headers on every request.
    pub fn new(
        source: impl Into<String>,
        fingerprints: Vec<Fingerprint>,
        extra: &[(String, String)],
        request_timeout: Duration,
        cooldown: Duration,
    ) -> SourceResult<Self> {
        let source = source.into();
        if fingerprints.is_empty() {
            return Err(SourceError::HttpClient(format!("{source}: empty fingerprint pool")));
        }
        let slots = fingerprints
            .into_iter()
            .map(|fingerprint| {
                let client = Client::builder()
                    .timeout(request_timeout)
                    .default_headers(fingerprint.headers(extra)?)
                    .build()
                    .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
                Ok(Slot {
                    fingerprint,
                    client,
                    blocked_until: Mutex::new(None),
                })
            })
            .collect::<SourceResult<Vec<_>>>()?;
        Ok(Self {
            source,
            slots,
            cursor: AtomicUsize::new(0),
            cooldown,
        })
    }

    /// Pool with the built-in identities and default cool-down.
    pub fn with_defaults(
        source: impl Into<String>,
        extra: &[(String, String)],
        request_timeout: Duration,
    ) -> SourceResult<Self> {
        Self::new(source, Fingerprint::defaults(), extra, request_timeout, DEFAULT_BLOCK_COOLDOWN)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Next identity, skipping cooling ones unless all are cooling.
    pub fn next(&self) -> Lease<'_> {
        let len = self.slots.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        let now = Instant::now();
        let index = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|i| !self.is_cooling_at(*i, now))
            .unwrap_or(start);
        if index != start {
            // keep rotation moving past the skipped identities
            self.cursor.store(index + 1, Ordering::Relaxed);
        }
        let slot = &self.slots[index];
        Lease {
            index,
            fingerprint: &slot.fingerprint,
            client: &slot.client,
        }
    }

    /// Put an identity into cool-down.
    pub fn mark_blocked(&self, index: usize) {
        if let Some(slot) = self.slots.get(index) {
            *slot.blocked_until.lock() = Some(Instant::now() + self.cooldown);
            Metrics::fingerprint_blocked(&self.source, &slot.fingerprint.id);
            warn!(
                source = %self.source,
                identity = %slot.fingerprint.id,
                cooldown_secs = self.cooldown.as_secs(),
                "Fingerprint blocked, cooling down"
            );
        }
    }

    pub fn is_cooling(&self, index: usize) -> bool {
        self.is_cooling_at(index, Instant::now())
    }

    fn is_cooling_at(&self, index: usize, now: Instant) -> bool {
        self.slots
            .get(index)
            .and_then(|slot| *slot.blocked_until.lock())
            .is_some_and(|until| now < until)
    }

    /// Send one request with the next identity and decode a JSON body.
    ///
    /// A blocked response puts the identity in cool-down.
    pub async fn execute<F>(&self, build: F) -> SourceResult<Value>
    where
        F: FnOnce(&Client) -> reqwest::RequestBuilder,
    {
        let lease = self.next();
        debug!(source = %self.source, identity = %lease.fingerprint.id, "Sending request");
        let result = http::send_json(build(lease.client)).await;
        if matches!(result, Err(SourceError::Blocked(_))) {
            self.mark_blocked(lease.index);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cooldown: Duration) -> FingerprintPool {
        FingerprintPool::new("fp_test", Fingerprint::defaults(), &[], Duration::from_secs(5), cooldown).unwrap()
    }

    #[test]
    fn test_default_identities() {
        let ids: Vec<_> = Fingerprint::defaults().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["chrome110", "chrome120", "chrome116", "safari15_3", "safari15_5"]);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let result = FingerprintPool::new("x", vec![], &[], Duration::from_secs(1), DEFAULT_BLOCK_COOLDOWN);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_extra_header_rejected() {
        let extra = vec![("bad header".to_string(), "v".to_string())];
        assert!(FingerprintPool::with_defaults("x", &extra, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_round_robin() {
        let pool = pool(DEFAULT_BLOCK_COOLDOWN);
        let order: Vec<_> = (0..6).map(|_| pool.next().index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_identity_skipped_until_cooldown_ends() {
        let pool = pool(Duration::from_secs(60));
        pool.mark_blocked(1);
        assert!(pool.is_cooling(1));
        let order: Vec<_> = (0..4).map(|_| pool.next().index).collect();
        assert!(!order.contains(&1));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!pool.is_cooling(1));
        let order: Vec<_> = (0..5).map(|_| pool.next().index).collect();
        assert!(order.contains(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_cooling_still_returns_identity() {
        let pool = pool(Duration::from_secs(60));
        for i in 0..pool.len() {
            pool.mark_blocked(i);
        }
        let lease = pool.next();
        assert!(lease.index < pool.len());
    }
}
