//! Rate-limited, caching JSON client for the source APIs.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::constants::{DEFAULT_RATE_LIMIT, RESPONSE_CACHE_TTL};
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// Method and optional JSON payload of a request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        RequestOptions {
            method: Method::GET,
            body: None,
        }
    }

    pub fn post(body: serde_json::Value) -> Self {
        RequestOptions {
            method: Method::POST,
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    method: String,
    endpoint: String,
    body: Option<String>,
}

impl RequestKey {
    fn new(endpoint: &str, options: &RequestOptions) -> Self {
        RequestKey {
            method: options.method.to_string(),
            endpoint: endpoint.to_string(),
            body: options.body.as_ref().map(|b| b.to_string()),
        }
    }
}

struct CachedResponse {
    body: serde_json::Value,
    stored_at: Instant,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth,
    min_interval: Duration,
    cache_ttl: Duration,
    last_request: Option<Instant>,
    cache: HashMap<RequestKey, CachedResponse>,
    request_count: u64,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: Auth::None,
            min_interval: DEFAULT_RATE_LIMIT,
            cache_ttl: RESPONSE_CACHE_TTL,
            last_request: None,
            cache: HashMap::new(),
            request_count: 0,
        }
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Auth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        };
        self
    }

    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.auth = Auth::Bearer(token.to_string());
        self
    }

    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Number of requests that actually went over the network.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Fetch `endpoint` (relative to the base URL) and decode the JSON body.
    ///
    /// Identical requests within the cache TTL are answered from memory. Any
    /// status >= 400 becomes [`SyncError::Api`] carrying the status and body text.
    pub async fn fetch<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> SyncResult<T> {
        let key = RequestKey::new(endpoint, options);

        if let Some(cached) = self.cache.get(&key) {
            if cached.stored_at.elapsed() < self.cache_ttl {
                tracing::debug!("Cache hit for: {}", endpoint);
                return Ok(serde_json::from_value(cached.body.clone())?);
            }
        }

        self.throttle().await;

        let url = format!("{}{}", self.base_url, endpoint);
        self.request_count += 1;
        tracing::debug!("API Request #{}: {} {}", self.request_count, options.method, url);

        let mut request = self.http.request(options.method.clone(), &url);
        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.as_u16() >= 400 {
            return Err(SyncError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: serde_json::Value = serde_json::from_str(&text)?;
        let decoded = serde_json::from_value(body.clone())?;

        self.cache.insert(
            key,
            CachedResponse {
                body,
                stored_at: Instant::now(),
            },
        );

        Ok(decoded)
    }

    /// Sleep until `min_interval` has passed since the previous request.
    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
