use std::env;

/// Configurable core settings. All read from environment variables with
/// sensible defaults.
///
/// Environment variables:
/// - `TEAMMESH_DATA_DIR` — Directory for database files (default: data)
/// - `TEAMMESH_SYNC_INTERVAL` — Seconds between peer sync cycles (default: 60)
/// - `TEAMMESH_PEER_TIMEOUT` — Total peer exchange budget, seconds (default: 30)
/// - `TEAMMESH_SEARCH_CACHE_TTL` — Semantic search cache TTL, seconds (default: 300)
/// - `TEAMMESH_INVITE_MAX_FAILURES` — Failed invite attempts per (code, ip) window (default: 5)
/// - `TEAMMESH_INVITE_WINDOW` — Invite failure window, seconds (default: 900)
/// - `TEAMMESH_PROMOTION_SWEEP_INTERVAL` — Delayed-promotion sweep interval, seconds (default: 60)
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: String,
    pub sync_interval_secs: u64,
    pub peer_timeout_secs: u64,
    pub search_cache_ttl_secs: u64,
    pub invite_max_failures: i64,
    pub invite_window_secs: i64,
    pub promotion_sweep_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            sync_interval_secs: 60,
            peer_timeout_secs: 30,
            search_cache_ttl_secs: 300,
            invite_max_failures: 5,
            invite_window_secs: 900,
            promotion_sweep_secs: 60,
        }
    }
}

impl CoreConfig {
    /// Create a CoreConfig from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("TEAMMESH_DATA_DIR")
            && !val.is_empty()
        {
            config.data_dir = val;
        }
        if let Ok(val) = env::var("TEAMMESH_SYNC_INTERVAL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.sync_interval_secs = n;
        }
        if let Ok(val) = env::var("TEAMMESH_PEER_TIMEOUT")
            && let Ok(n) = val.parse::<u64>()
        {
            config.peer_timeout_secs = n;
        }
        if let Ok(val) = env::var("TEAMMESH_SEARCH_CACHE_TTL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.search_cache_ttl_secs = n;
        }
        if let Ok(val) = env::var("TEAMMESH_INVITE_MAX_FAILURES")
            && let Ok(n) = val.parse::<i64>()
        {
            config.invite_max_failures = n;
        }
        if let Ok(val) = env::var("TEAMMESH_INVITE_WINDOW")
            && let Ok(n) = val.parse::<i64>()
        {
            config.invite_window_secs = n;
        }
        if let Ok(val) = env::var("TEAMMESH_PROMOTION_SWEEP_INTERVAL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.promotion_sweep_secs = n;
        }

        config
    }

    /// Create a config rooted at a specific data directory (tests, embedders).
    pub fn with_data_dir(dir: &str) -> Self {
        Self {
            data_dir: dir.to_string(),
            ..Self::default()
        }
    }

    pub fn app_db_path(&self) -> String {
        format!("{}/teammesh.db", self.data_dir)
    }

    pub fn chat_db_path(&self) -> String {
        format!("{}/chat_memory.db", self.data_dir)
    }

    pub fn workflows_db_path(&self) -> String {
        format!("{}/workflows.db", self.data_dir)
    }
}
