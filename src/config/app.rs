//! Main application configuration
//!
//! This module defines the primary configuration structures for the meeting
//! matcher, including environment variable loading, TOML files and validation.

use crate::friends::FriendLookupPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matching: MatchingSettings,
    pub queue: QueueSettings,
    pub friends: FriendSettings,
    pub video: VideoSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matching behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Participants per side in a group (K)
    pub group_size: usize,
    /// How many times a stale match result is retried with a fresh snapshot
    pub max_stale_retries: u32,
    /// Pending requests the match worker buffers before dispatch waits
    pub worker_queue_capacity: usize,
    /// What to do when a friend lookup fails
    pub friend_lookup_policy: FriendLookupPolicy,
}

/// Which store backs the participant queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Memory,
    Redis,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(QueueBackend::Memory),
            "redis" => Ok(QueueBackend::Redis),
            other => Err(format!("Unknown queue backend: {}", other)),
        }
    }
}

/// Participant queue storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub backend: QueueBackend,
    /// Redis URL, used by the redis backend
    pub redis_url: String,
    /// Key prefix for the per-gender lists
    pub key_prefix: String,
}

/// Friend index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendSettings {
    /// Base URL of the social graph service; an in-memory graph is used when unset
    pub social_graph_url: Option<String>,
    /// Maximum cached friend sets
    pub cache_capacity: u64,
    /// Friend set time-to-live in seconds
    pub cache_ttl_seconds: u64,
    /// Timeout for a single social graph request in milliseconds
    pub request_timeout_ms: u64,
}

/// Which video conference provider backs sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBackend {
    InMemory,
    OpenVidu,
}

impl FromStr for VideoBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inmemory" | "memory" => Ok(VideoBackend::InMemory),
            "openvidu" => Ok(VideoBackend::OpenVidu),
            other => Err(format!("Unknown video provider: {}", other)),
        }
    }
}

/// Video provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub provider: VideoBackend,
    pub openvidu_url: String,
    pub openvidu_secret: String,
    /// Timeout for a single provider request in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "meeting-matcher".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            group_size: 3,
            max_stale_retries: 1,
            worker_queue_capacity: 64,
            friend_lookup_policy: FriendLookupPolicy::FailClosed,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "meeting:queue".to_string(),
        }
    }
}

impl Default for FriendSettings {
    fn default() -> Self {
        Self {
            social_graph_url: None,
            cache_capacity: 10_000,
            cache_ttl_seconds: 300, // 5 minutes
            request_timeout_ms: 2_000,
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            provider: VideoBackend::InMemory,
            openvidu_url: "http://localhost:4443".to_string(),
            openvidu_secret: String::new(),
            request_timeout_ms: 5_000,
        }
    }
}

/// Parse an optional environment variable, naming it in the error
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML configuration")
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(port) = env_parse("HEALTH_PORT")? {
            self.service.health_port = port;
        }
        if let Some(timeout) = env_parse("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Matching settings
        if let Some(size) = env_parse("GROUP_SIZE")? {
            self.matching.group_size = size;
        }
        if let Some(retries) = env_parse("MAX_STALE_RETRIES")? {
            self.matching.max_stale_retries = retries;
        }
        if let Some(capacity) = env_parse("WORKER_QUEUE_CAPACITY")? {
            self.matching.worker_queue_capacity = capacity;
        }
        if let Some(policy) = env_parse("FRIEND_LOOKUP_POLICY")? {
            self.matching.friend_lookup_policy = policy;
        }

        // Queue settings
        if let Some(backend) = env_parse("QUEUE_BACKEND")? {
            self.queue.backend = backend;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.queue.redis_url = url;
        }
        if let Ok(prefix) = env::var("QUEUE_KEY_PREFIX") {
            self.queue.key_prefix = prefix;
        }

        // Friend settings
        if let Ok(url) = env::var("SOCIAL_GRAPH_URL") {
            self.friends.social_graph_url = Some(url);
        }
        if let Some(capacity) = env_parse("FRIEND_CACHE_CAPACITY")? {
            self.friends.cache_capacity = capacity;
        }
        if let Some(ttl) = env_parse("FRIEND_CACHE_TTL_SECONDS")? {
            self.friends.cache_ttl_seconds = ttl;
        }

        // Video settings
        if let Some(provider) = env_parse("VIDEO_PROVIDER")? {
            self.video.provider = provider;
        }
        if let Ok(url) = env::var("OPENVIDU_URL") {
            self.video.openvidu_url = url;
        }
        if let Ok(secret) = env::var("OPENVIDU_SECRET") {
            self.video.openvidu_secret = secret;
        }
        if let Some(timeout) = env_parse("PROVIDER_TIMEOUT_MS")? {
            self.video.request_timeout_ms = timeout;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get friend cache TTL as Duration
    pub fn friend_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.friends.cache_ttl_seconds)
    }

    /// Get social graph request timeout as Duration
    pub fn social_graph_timeout(&self) -> Duration {
        Duration::from_millis(self.friends.request_timeout_ms)
    }

    /// Get video provider request timeout as Duration
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.video.request_timeout_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matching settings
    if config.matching.group_size == 0 {
        return Err(anyhow!("Group size must be greater than 0"));
    }
    if config.matching.group_size > 8 {
        return Err(anyhow!("Group size cannot exceed 8 participants per side"));
    }
    if config.matching.worker_queue_capacity == 0 {
        return Err(anyhow!("Worker queue capacity must be greater than 0"));
    }

    // Validate queue settings
    if config.queue.key_prefix.is_empty() {
        return Err(anyhow!("Queue key prefix cannot be empty"));
    }
    if config.queue.backend == QueueBackend::Redis && config.queue.redis_url.is_empty() {
        return Err(anyhow!("Redis URL cannot be empty for the redis queue backend"));
    }

    // Validate friend settings
    if config.friends.cache_capacity == 0 {
        return Err(anyhow!("Friend cache capacity must be greater than 0"));
    }
    if config.friends.cache_ttl_seconds == 0 {
        return Err(anyhow!("Friend cache TTL must be greater than 0"));
    }
    if matches!(&config.friends.social_graph_url, Some(url) if url.is_empty()) {
        return Err(anyhow!("Social graph URL cannot be empty when set"));
    }

    // Validate video settings
    if config.video.provider == VideoBackend::OpenVidu {
        if config.video.openvidu_url.is_empty() {
            return Err(anyhow!("OpenVidu URL cannot be empty"));
        }
        if config.video.openvidu_secret.is_empty() {
            return Err(anyhow!("OpenVidu secret cannot be empty"));
        }
    }
    if config.video.request_timeout_ms == 0 {
        return Err(anyhow!("Provider request timeout must be greater than 0"));
    }

    Ok(())
}
