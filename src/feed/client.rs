//! HTTP client for the odds provider's score feeds.
//!
//! The provider exposes one endpoint per sport and time window:
//! `{base_url}/{sport}/{window}` where the window is `home` for today's
//! (live) scores and `d-1`, `d-2`, ... for finished days. Responses are
//! sport-specific JSON with no schema contract; they are kept as raw
//! `serde_json::Value` until normalization.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::{FeedConfig, FeedMode};

use super::{FeedError, FeedResult};

/// Which upstream time window a fetch targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Today's scores page (`home`), covering live and just-finished matches.
    Live,
    /// Historical window N days back (`d-1`, `d-2`, ...).
    DaysBack(u8),
}

impl EndpointClass {
    pub fn as_path(&self) -> String {
        match self {
            EndpointClass::Live => "home".to_string(),
            EndpointClass::DaysBack(n) => format!("d-{n}"),
        }
    }
}

type CacheKey = (String, EndpointClass);

struct CacheEntry {
    fetched_at: Instant,
    payload: Arc<Value>,
}

enum FeedBackend {
    Http {
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
    },
    /// Canned payloads keyed by (sport, window); used by dry runs and tests.
    Fixture {
        payloads: HashMap<CacheKey, Arc<Value>>,
    },
}

/// Feed client with a short-lived per-(sport, window) response cache.
///
/// The cache bounds upstream call volume within one settlement cycle: every
/// wager leg sharing a (sport, window) pair resolves against the same
/// response. Refresh is single-writer — only the fetch that observed the
/// miss repopulates the entry.
pub struct FeedClient {
    backend: FeedBackend,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    retries: u32,
    upstream_calls: AtomicU64,
}

impl FeedClient {
    pub fn from_config(cfg: &FeedConfig) -> FeedResult<Self> {
        let backend = match cfg.mode {
            FeedMode::Http => {
                let http = reqwest::Client::builder()
                    .user_agent("bet-settlement-bot/0.1")
                    .timeout(cfg.timeout())
                    .build()?;
                FeedBackend::Http {
                    http,
                    base_url: cfg.base_url.trim_end_matches('/').to_string(),
                    api_key: cfg.api_key.clone(),
                }
            }
            FeedMode::Fixture => {
                let dir = cfg.fixture_dir.as_deref().ok_or_else(|| {
                    FeedError::Config("fixture mode requires [feed] fixture_dir".to_string())
                })?;
                FeedBackend::Fixture {
                    payloads: load_fixture_dir(Path::new(dir))?,
                }
            }
        };

        Ok(Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            ttl: cfg.cache_ttl(),
            retries: cfg.retries,
            upstream_calls: AtomicU64::new(0),
        })
    }

    /// Build a client over in-memory payloads; used by integration tests.
    pub fn fixture(payloads: Vec<((String, EndpointClass), Value)>, ttl: Duration) -> Self {
        let payloads = payloads
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        Self {
            backend: FeedBackend::Fixture { payloads },
            cache: Mutex::new(HashMap::new()),
            ttl,
            retries: 0,
            upstream_calls: AtomicU64::new(0),
        }
    }

    /// Number of actual backend fetches performed (cache misses).
    pub fn upstream_calls(&self) -> u64 {
        self.upstream_calls.load(Ordering::Relaxed)
    }

    /// Fetch the raw payload for one (sport, window), serving from cache
    /// when a fresh entry exists.
    pub async fn fetch(&self, sport_key: &str, class: EndpointClass) -> FeedResult<Arc<Value>> {
        let key = (sport_key.to_string(), class);

        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(
                        target: "feed",
                        sport = sport_key,
                        window = %class.as_path(),
                        "serving payload from cache"
                    );
                    return Ok(Arc::clone(&entry.payload));
                }
            }
        }

        let payload = self.fetch_with_retries(sport_key, class).await?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                payload: Arc::clone(&payload),
            },
        );

        Ok(payload)
    }

    /// Cache-bypassing fetch for debugging paths.
    pub async fn fetch_uncached(
        &self,
        sport_key: &str,
        class: EndpointClass,
    ) -> FeedResult<Arc<Value>> {
        self.fetch_with_retries(sport_key, class).await
    }

    async fn fetch_with_retries(
        &self,
        sport_key: &str,
        class: EndpointClass,
    ) -> FeedResult<Arc<Value>> {
        let mut attempt = 0;
        loop {
            match self.backend_fetch(sport_key, class).await {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        target: "feed",
                        sport = sport_key,
                        window = %class.as_path(),
                        attempt,
                        error = %err,
                        "transient feed error; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn backend_fetch(
        &self,
        sport_key: &str,
        class: EndpointClass,
    ) -> FeedResult<Arc<Value>> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);

        match &self.backend {
            FeedBackend::Http {
                http,
                base_url,
                api_key,
            } => {
                let url = format!("{}/{}/{}", base_url, sport_key, class.as_path());
                let mut req = http.get(&url);
                if let Some(key) = api_key {
                    req = req.query(&[("key", key.as_str())]);
                }

                let resp = req.send().await?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(FeedError::HttpStatus { status, body });
                }

                let text = resp.text().await?;
                let payload: Value = serde_json::from_str(&text)?;
                debug!(
                    target: "feed",
                    sport = sport_key,
                    window = %class.as_path(),
                    bytes = text.len(),
                    "fetched feed payload"
                );
                Ok(Arc::new(payload))
            }
            FeedBackend::Fixture { payloads } => payloads
                .get(&(sport_key.to_string(), class))
                .cloned()
                .ok_or_else(|| FeedError::MissingFixture {
                    sport: sport_key.to_string(),
                    window: class.as_path(),
                }),
        }
    }
}

/// Load `{sport}_{window}.json` files from a fixture directory.
fn load_fixture_dir(dir: &Path) -> FeedResult<HashMap<CacheKey, Arc<Value>>> {
    let mut payloads = HashMap::new();
    let entries = fs::read_dir(dir)
        .map_err(|e| FeedError::Config(format!("cannot read fixture dir {}: {e}", dir.display())))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| FeedError::Config(format!("cannot read fixture entry: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => continue,
        };
        let key = match parse_fixture_name(stem) {
            Some(k) => k,
            None => {
                warn!(target: "feed", file = %path.display(), "ignoring unrecognized fixture name");
                continue;
            }
        };
        let contents = fs::read_to_string(&path)
            .map_err(|e| FeedError::Config(format!("cannot read {}: {e}", path.display())))?;
        let payload: Value = serde_json::from_str(&contents)?;
        payloads.insert(key, Arc::new(payload));
    }

    Ok(payloads)
}

/// Parse a fixture file stem like `soccer_home` or `baseball_d-2`.
fn parse_fixture_name(stem: &str) -> Option<CacheKey> {
    let (sport, window) = stem.rsplit_once('_')?;
    let class = if window == "home" {
        EndpointClass::Live
    } else {
        let days = window.strip_prefix("d-")?.parse::<u8>().ok()?;
        EndpointClass::DaysBack(days)
    };
    Some((sport.to_string(), class))
}
