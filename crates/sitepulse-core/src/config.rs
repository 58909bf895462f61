#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// Per-partition retention cap: oldest events are evicted once a day
    /// file reaches this many entries.
    pub partition_cap: usize,
    /// Width of the realtime window in seconds (default 300 = 5 minutes).
    pub realtime_window_secs: u64,
    pub scheduler_tick_seconds: u64,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("SITEPULSE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("SITEPULSE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            partition_cap: std::env::var("SITEPULSE_PARTITION_CAP")
                .unwrap_or_else(|_| "50000".to_string())
                .parse()
                .unwrap_or(50_000),
            realtime_window_secs: std::env::var("SITEPULSE_REALTIME_WINDOW_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            scheduler_tick_seconds: std::env::var("SITEPULSE_SCHEDULER_TICK_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(60),
            cors_origins: std::env::var("SITEPULSE_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".to_string(),
            partition_cap: 50_000,
            realtime_window_secs: 300,
            scheduler_tick_seconds: 60,
            cors_origins: vec![],
        }
    }
}
