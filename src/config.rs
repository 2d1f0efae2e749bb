use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    pub poll: PollConfig,
    pub snapshot: SnapshotConfig,
    pub geo: GeoConfig,
    pub web: WebConfig,
    pub insight: InsightConfig,
    pub display: DisplayConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    /// Seconds between collection cycles
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_interval")]
    pub interval_secs: u64,
    /// Max snapshot rows kept in memory before rotation
    #[serde(default = "default_snapshot_max")]
    pub max_entries: usize,
    /// Optional JSONL file; snapshots are appended and reloaded on start
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// ip-api style endpoint; the node IP is appended as a path segment
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
    /// Cap on fresh lookups per cycle (free geo APIs rate-limit hard)
    #[serde(default = "default_geo_budget")]
    pub max_lookups_per_cycle: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_address")]
    pub address: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InsightConfig {
    /// Cluster TPS below this emits a throughput warning
    #[serde(default = "default_tps_threshold")]
    pub tps_warning_threshold: f64,
    /// Decentralization measure at or below this emits a concentration warning
    #[serde(default = "default_min_nakamoto")]
    pub min_nakamoto_coefficient: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Entries kept in version/ISP distribution breakdowns
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    /// Known operators, matched by identity-key prefix
    #[serde(default)]
    pub labels: Vec<IdentityLabel>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityLabel {
    pub prefix: String,
    pub name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { labels: Vec::new() }
    }
}

// Default value functions
fn default_rpc_url() -> String { "http://127.0.0.1:8899".to_string() }
fn default_rpc_timeout_ms() -> u64 { 10_000 }
fn default_poll_interval() -> u64 { 30 }
fn default_snapshot_interval() -> u64 { 60 }
fn default_snapshot_max() -> usize { 1440 }
fn default_true() -> bool { true }
fn default_geo_endpoint() -> String { "http://ip-api.com/json".to_string() }
fn default_geo_timeout_ms() -> u64 { 3000 }
fn default_geo_budget() -> usize { 40 }
fn default_web_address() -> String { "0.0.0.0".to_string() }
fn default_web_port() -> u16 { 8080 }
fn default_tps_threshold() -> f64 { 1000.0 }
fn default_min_nakamoto() -> usize { 3 }
fn default_top_n() -> usize { 6 }

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))?;
        Ok(config)
    }
}
