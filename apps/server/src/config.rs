//! Configuration management for ingestion and the query API

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty means no cross-origin access.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Which graph store implementation to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Neo4j,
    /// Process-local store. Contents are lost on exit.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub backend: GraphBackend,
    /// Bolt endpoint, e.g. `bolt://localhost:7687`
    #[serde(default = "default_graph_uri")]
    pub uri: String,
    #[serde(default = "default_graph_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Target database name. Uses the server default when unset.
    pub database: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Rows fetched per round-trip when streaming results.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Upper bound for a single store call. Default: 30 seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::default(),
            uri: default_graph_uri(),
            user: default_graph_user(),
            password: String::new(),
            database: None,
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl GraphConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Directory scanned for bundle files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Only files with this extension are treated as bundles.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Conditions considered per patient when building the temporal chain.
    /// The earliest N by onset date are kept. Default: 500
    #[serde(default = "default_max_conditions_per_patient")]
    pub max_conditions_per_patient: usize,
    /// Remove every node and relationship before ingesting.
    #[serde(default)]
    pub clear_before_ingest: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_extension: default_file_extension(),
            max_conditions_per_patient: default_max_conditions_per_patient(),
            clear_before_ingest: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Page size when `limit` is not given. Default: 100
    #[serde(default = "default_api_limit")]
    pub default_limit: usize,
    /// Largest accepted `limit`. Default: 1000
    #[serde(default = "default_api_max_limit")]
    pub max_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: default_api_limit(),
            max_limit: default_api_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting for logs
    #[serde(default)]
    pub json: bool,

    /// Enable file logging in addition to console
    #[serde(default)]
    pub file_enabled: bool,

    /// Directory for log files (default: ./logs)
    #[serde(default = "default_log_directory")]
    pub file_directory: String,

    /// Log file prefix (default: fhirgraph)
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,

    /// Log rotation: daily, hourly, minutely, never (default: daily)
    #[serde(default = "default_log_rotation")]
    pub file_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file_enabled: false,
            file_directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            file_rotation: default_log_rotation(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_graph_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_graph_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_fetch_size() -> usize {
    500
}

fn default_request_timeout() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_file_extension() -> String {
    "json".to_string()
}

fn default_max_conditions_per_patient() -> usize {
    500
}

fn default_api_limit() -> usize {
    100
}

fn default_api_max_limit() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "./logs".to_string()
}

fn default_log_file_prefix() -> String {
    "fhirgraph".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from defaults, an optional `fhirgraph` config file
    /// and `FHIRGRAPH__*` environment variables, in that order of precedence.
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("graph.backend", "neo4j")?
            .set_default("graph.uri", default_graph_uri())?
            .set_default("graph.user", default_graph_user())?
            .set_default("graph.password", "")?
            .set_default("graph.max_connections", default_max_connections() as i64)?
            .set_default("graph.fetch_size", default_fetch_size() as i64)?
            .set_default("graph.request_timeout_seconds", default_request_timeout())?
            .set_default("ingest.data_dir", "./data")?
            .set_default("ingest.file_extension", default_file_extension())?
            .set_default(
                "ingest.max_conditions_per_patient",
                default_max_conditions_per_patient() as i64,
            )?
            .set_default("ingest.clear_before_ingest", false)?
            .set_default("api.default_limit", default_api_limit() as i64)?
            .set_default("api.max_limit", default_api_max_limit() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .set_default("logging.file_enabled", false)?
            .set_default("logging.file_directory", default_log_directory())?
            .set_default("logging.file_prefix", default_log_file_prefix())?
            .set_default("logging.file_rotation", default_log_rotation())?
            .add_source(config::File::with_name("fhirgraph").required(false))
            // Example: FHIRGRAPH__GRAPH__URI → config.graph.uri
            // Arrays use comma separator: FHIRGRAPH__SERVER__CORS_ORIGINS=https://a.com,https://b.com
            .add_source(
                config::Environment::with_prefix("FHIRGRAPH")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;

        // Conventional Neo4j variables fill in credentials when no explicit override is present.
        if std::env::var("FHIRGRAPH__GRAPH__PASSWORD").is_err() {
            if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
                config.graph.password = password;
            }
        }
        if std::env::var("FHIRGRAPH__GRAPH__URI").is_err() {
            if let Ok(uri) = std::env::var("NEO4J_URI") {
                config.graph.uri = uri;
            }
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        Ok(addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.graph.backend == GraphBackend::Neo4j && self.graph.uri.trim().is_empty() {
            return Err("graph.uri must be set for the neo4j backend".to_string());
        }
        if self.graph.max_connections == 0 {
            return Err("graph.max_connections must be > 0".to_string());
        }
        if self.graph.fetch_size == 0 {
            return Err("graph.fetch_size must be > 0".to_string());
        }
        if self.graph.request_timeout_seconds == 0 {
            return Err("graph.request_timeout_seconds must be > 0".to_string());
        }
        if self.ingest.max_conditions_per_patient < 2 {
            return Err("ingest.max_conditions_per_patient must be >= 2".to_string());
        }
        if self.ingest.file_extension.trim_start_matches('.').is_empty() {
            return Err("ingest.file_extension must not be empty".to_string());
        }
        if self.api.max_limit == 0 {
            return Err("api.max_limit must be > 0".to_string());
        }
        if self.api.default_limit == 0 || self.api.default_limit > self.api.max_limit {
            return Err("api.default_limit must be between 1 and api.max_limit".to_string());
        }
        if !matches!(
            self.logging.file_rotation.as_str(),
            "daily" | "hourly" | "minutely" | "never"
        ) {
            return Err(
                "logging.file_rotation must be one of: daily, hourly, minutely, never".to_string(),
            );
        }

        Ok(())
    }
}
