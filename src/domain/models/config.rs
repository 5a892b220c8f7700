use serde::{Deserialize, Serialize};

/// Main configuration structure for Questline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event stream configuration
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Quest snapshot reload configuration
    #[serde(default)]
    pub quests: QuestsConfig,

    /// Identity network client configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Partner service configuration
    #[serde(default)]
    pub partner: PartnerConfig,

    /// Seconds between throughput statistics lines
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".questline/questline.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}

/// Event stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamsConfig {
    /// Firehose relay websocket endpoint
    #[serde(default = "default_firehose_url")]
    pub firehose_url: String,

    /// Jetstream websocket endpoint
    #[serde(default = "default_jetstream_url")]
    pub jetstream_url: String,

    /// Collections subscribed to in addition to posts
    #[serde(default)]
    pub extra_collections: Vec<String>,

    /// Flush the cursor every N consumed events
    #[serde(default = "default_cursor_flush_every")]
    pub cursor_flush_every: u32,

    /// Reconnect backoff policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_firehose_url() -> String {
    "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos".to_string()
}

fn default_jetstream_url() -> String {
    "wss://jetstream2.us-east.bsky.network/subscribe".to_string()
}

const fn default_cursor_flush_every() -> u32 {
    100
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            firehose_url: default_firehose_url(),
            jetstream_url: default_jetstream_url(),
            extra_collections: Vec::new(),
            cursor_flush_every: default_cursor_flush_every(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect backoff policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconnectConfig {
    /// First delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Delay cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Random jitter factor in [0, 1)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_initial_backoff_ms() -> u64 {
    5_000
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

const fn default_jitter() -> f64 {
    0.2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Number of workers evaluating and executing quests
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Bounded queue capacity between the receive loop and workers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for in-flight jobs on shutdown
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

const fn default_pool_size() -> usize {
    3
}

const fn default_queue_capacity() -> usize {
    512
}

const fn default_drain_timeout_secs() -> u64 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

/// Quest snapshot reload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuestsConfig {
    /// Seconds between quest snapshot reloads
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// Seconds between tracked identity refreshes
    #[serde(default = "default_identity_refresh_secs")]
    pub identity_refresh_secs: u64,
}

const fn default_reload_interval_secs() -> u64 {
    300
}

const fn default_identity_refresh_secs() -> u64 {
    300
}

impl Default for QuestsConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: default_reload_interval_secs(),
            identity_refresh_secs: default_identity_refresh_secs(),
        }
    }
}

/// Identity network client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NetworkConfig {
    /// Public read API
    #[serde(default = "default_appview_url")]
    pub appview_url: String,

    /// PDS hosting the automation account
    #[serde(default = "default_pds_url")]
    pub pds_url: String,

    /// DID directory used to locate other users' PDS
    #[serde(default = "default_plc_url")]
    pub plc_url: String,

    /// Handle of the automation account
    #[serde(default)]
    pub handle: Option<String>,

    /// App password of the automation account
    #[serde(default)]
    pub app_password: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Outbound requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_appview_url() -> String {
    "https://public.api.bsky.app".to_string()
}

fn default_pds_url() -> String {
    "https://bsky.social".to_string()
}

fn default_plc_url() -> String {
    "https://plc.directory".to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_requests_per_second() -> u32 {
    10
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            appview_url: default_appview_url(),
            pds_url: default_pds_url(),
            plc_url: default_plc_url(),
            handle: None,
            app_password: None,
            timeout_ms: default_timeout_ms(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Partner service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PartnerConfig {
    /// Structured partner API; when unset only the generic record lookup runs
    #[serde(default)]
    pub api_base: Option<String>,

    /// Lookup budget in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

const fn default_lookup_timeout_ms() -> u64 {
    3_000
}

impl Default for PartnerConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

/// Statistics output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval_secs")]
    pub interval_secs: u64,
}

const fn default_stats_interval_secs() -> u64 {
    30
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval_secs(),
        }
    }
}
