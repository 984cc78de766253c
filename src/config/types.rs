use crate::limiter::{default_limits, EndpointLimit, KEYWORD_SEARCH_ENDPOINT};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for Keyword Harvester
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub source: SourceConfig,
    pub rate_limits: HashMap<String, EndpointLimit>,
    pub retry: RetryConfig,
    pub recovery: RecoveryConfig,
    pub cache: CacheConfig,
    pub jobs: JobsConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            rate_limits: default_limits(),
            retry: RetryConfig::default(),
            recovery: RecoveryConfig::default(),
            cache: CacheConfig::default(),
            jobs: JobsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Adds the built-in limits for any endpoint the file did not mention
    pub fn fill_default_limits(&mut self) {
        for (endpoint, limit) in default_limits() {
            self.rate_limits.entry(endpoint).or_insert(limit);
        }
    }

    /// Returns the limit configured for an endpoint key
    ///
    /// Unknown keys fall back to the keyword search limit.
    pub fn limit_for(&self, endpoint: &str) -> EndpointLimit {
        self.rate_limits
            .get(endpoint)
            .or_else(|| self.rate_limits.get(KEYWORD_SEARCH_ENDPOINT))
            .copied()
            .unwrap_or_default()
    }
}

/// Content source connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceConfig {
    /// Query endpoint that renders search result pages
    pub endpoint: String,

    /// Source identifier sent with every query
    pub source_name: String,

    /// Geo location sent with every query
    pub geo_location: String,

    /// User agent type requested from the source
    pub user_agent_type: String,

    /// Base URL used to resolve relative listing links
    pub base_url: String,

    /// Marketplace name stamped on extracted records
    pub marketplace: String,

    /// Optional basic auth user name
    pub username: Option<String>,

    /// Optional basic auth password
    pub password: Option<String>,

    /// Timeout for a single page fetch (seconds)
    pub timeout_secs: u64,

    /// Connect timeout for a single page fetch (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://realtime.oxylabs.io/v1/queries".to_string(),
            source_name: "target_search".to_string(),
            geo_location: "United States".to_string(),
            user_agent_type: "desktop".to_string(),
            base_url: "https://www.target.com".to_string(),
            marketplace: "Target".to_string(),
            username: None,
            password: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

/// Per-fetch retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    /// Total attempts per page fetch, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt (milliseconds)
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

/// Job-level recovery settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RecoveryConfig {
    /// Number of whole-job re-runs before dead-lettering
    pub max_retries: u32,

    /// Delay before each re-run (seconds); the last entry repeats
    pub retry_delays_secs: Vec<u64>,

    /// JSON file backing the dead-letter queue
    pub dead_letter_path: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delays_secs: vec![60, 300, 900],
            dead_letter_path: "dead_letter_queue.json".to_string(),
        }
    }
}

impl RecoveryConfig {
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// Lifetime of a cached harvest (seconds)
    pub ttl_secs: u64,

    /// Maximum number of cached harvests
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            max_entries: 1_000,
        }
    }
}

/// Job request limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct JobsConfig {
    /// Page budget used when a request does not name one
    pub default_max_pages: u32,

    /// Largest page budget a request may ask for
    pub max_pages_limit: u32,

    /// Longest accepted keyword (characters, after trimming)
    pub max_keyword_length: usize,

    /// Buffered events per progress subscriber before it is dropped
    pub subscriber_buffer: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_max_pages: 5,
            max_pages_limit: 20,
            max_keyword_length: 100,
            subscriber_buffer: 64,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Path to the SQLite database receiving harvested records
    pub database_path: Option<String>,
}
