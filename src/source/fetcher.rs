//! HTTP page fetcher
//!
//! Pages are fetched through a rendering query API: every page request is a
//! JSON POST describing the search, and the rendered HTML comes back inside
//! the JSON response at `results[0].content`.
//!
//! Response mapping:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | 2xx | `RawPage` with the rendered content |
//! | HTTP 429 | `RateLimited`, with the `Retry-After` seconds when present |
//! | HTTP 5xx | `Server(code)` |
//! | Other 4xx | `Client(code)` |
//! | Timeout / connection failure | `Transient` |
//! | Unparseable JSON body | `Malformed` |

use crate::config::SourceConfig;
use crate::source::{FetchError, PageFetcher, RawPage};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    content: Option<String>,
}

/// Builds the HTTP client used for page fetches
///
/// # Arguments
///
/// * `config` - The source configuration (timeouts)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageFetcher`] backed by a rendering query API
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    endpoint: String,
    source_name: String,
    geo_location: String,
    user_agent_type: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpPageFetcher {
    /// Creates a fetcher with its own HTTP client
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a fetcher sharing an existing HTTP client
    pub fn with_client(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            source_name: config.source_name.clone(),
            geo_location: config.geo_location.clone(),
            user_agent_type: config.user_agent_type.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn payload(&self, keyword: &str, page: u32) -> serde_json::Value {
        json!({
            "source": self.source_name,
            "query": keyword,
            "geo_location": self.geo_location,
            "render": "html",
            "user_agent_type": self.user_agent_type,
            "start_page": page,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, keyword: &str, page: u32) -> Result<RawPage, FetchError> {
        let mut request = self.client.post(&self.endpoint).json(&self.payload(keyword, page));
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        tracing::debug!("Fetching page {} for '{}'", page, keyword);

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }

        if status.is_server_error() {
            return Err(FetchError::Server(status.as_u16()));
        }

        if status.is_client_error() {
            return Err(FetchError::Client(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_request_error)?;
        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        let content = parsed
            .results
            .into_iter()
            .next()
            .and_then(|result| result.content)
            .unwrap_or_default();

        Ok(RawPage {
            status: status.as_u16(),
            content,
        })
    }
}

fn classify_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Transient("request timed out".to_string())
    } else if err.is_connect() {
        FetchError::Transient(format!("connection failed: {}", err))
    } else if err.is_decode() {
        FetchError::Malformed(err.to_string())
    } else {
        FetchError::Transient(err.to_string())
    }
}
