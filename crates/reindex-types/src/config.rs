//! Configuration loading for reindex-lab.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/reindex-lab/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ReindexError;

const APP_NAME: &str = "reindex-lab";

/// Which vector store implementation to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// Remote Qdrant collection over REST (default)
    #[default]
    Qdrant,
    /// Process-local store, contents are lost on exit
    Memory,
}

/// Vector store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Base URL of the Qdrant REST API
    #[serde(default = "default_vector_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Must match the embedder's output dimension.
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_vector_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "chunks".to_string()
}

fn default_vector_size() -> usize {
    384
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            url: default_vector_url(),
            collection: default_collection(),
            vector_size: default_vector_size(),
            api_key: None,
        }
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.vector_size == 0 {
            return Err("vector_size must be > 0".to_string());
        }
        if self.collection.trim().is_empty() {
            return Err("collection must not be empty".to_string());
        }
        if self.backend == VectorBackend::Qdrant && !self.url.starts_with("http") {
            return Err(format!("url must be an http(s) URL, got {}", self.url));
        }
        Ok(())
    }
}

/// Distributed lock tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock key TTL; bounds how long a crashed holder blocks others.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,

    /// Delay between acquisition attempts.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_lock_max_attempts")]
    pub max_attempts: u32,
}

fn default_lock_ttl_secs() -> u64 {
    300
}

fn default_lock_retry_delay_ms() -> u64 {
    100
}

fn default_lock_max_attempts() -> u32 {
    50
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
            retry_delay_ms: default_lock_retry_delay_ms(),
            max_attempts: default_lock_max_attempts(),
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("ttl_secs must be > 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

/// Priority queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failed jobs are re-enqueued until retry_count reaches this.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Worker sleep when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Terminal jobs older than this are removed by cleanup.
    #[serde(default = "default_cleanup_after_minutes")]
    pub cleanup_after_minutes: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_cleanup_after_minutes() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            cleanup_after_minutes: default_cleanup_after_minutes(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be > 0".to_string());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Thresholds used by recovery scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_stuck_document_minutes")]
    pub stuck_document_minutes: u64,

    #[serde(default = "default_stuck_lock_minutes")]
    pub stuck_lock_minutes: u64,
}

fn default_stuck_document_minutes() -> u64 {
    5
}

fn default_stuck_lock_minutes() -> u64 {
    10
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stuck_document_minutes: default_stuck_document_minutes(),
            stuck_lock_minutes: default_stuck_lock_minutes(),
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.stuck_document_minutes == 0 || self.stuck_lock_minutes == 0 {
            return Err("recovery thresholds must be > 0 minutes".to_string());
        }
        Ok(())
    }
}

/// Text splitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    500
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB coordination store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Strategy used when a command does not name one
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Directory holding `<documentId>.txt` content for queued jobs
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub splitter: SplitterConfig,
}

fn data_dir_path(leaf: &str) -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join(leaf))
        .unwrap_or_else(|| PathBuf::from(".").join(leaf))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir_path("coordination")
}

fn default_content_dir() -> String {
    data_dir_path("documents")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_strategy() -> String {
    "blue-green".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            default_strategy: default_strategy(),
            content_dir: default_content_dir(),
            vector_store: VectorStoreConfig::default(),
            lock: LockConfig::default(),
            queue: QueueConfig::default(),
            recovery: RecoveryConfig::default(),
            splitter: SplitterConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reindex-lab/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEX_*, nested with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ReindexError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("default_strategy", default_strategy())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("content_dir", default_content_dir())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: REINDEX_DB_PATH, REINDEX_LOCK__TTL_SECS, REINDEX_VECTOR_STORE__URL
        builder = builder.add_source(
            Environment::with_prefix("REINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ReindexError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ReindexError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every nested section.
    pub fn validate(&self) -> Result<(), ReindexError> {
        self.vector_store
            .validate()
            .and_then(|_| self.lock.validate())
            .and_then(|_| self.queue.validate())
            .and_then(|_| self.recovery.validate())
            .and_then(|_| self.splitter.validate())
            .map_err(ReindexError::Config)
    }

    /// Expand `~` in db_path.
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand `~` in content_dir.
    pub fn expanded_content_dir(&self) -> PathBuf {
        expand_home(&self.content_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
