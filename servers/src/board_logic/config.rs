use clap::Parser;
use lib_transit::feed::{Backoff, SessionConfig};
use lib_transit::feed::session::{DEFAULT_ENDPOINT, DEFAULT_LINE_IDS, DEFAULT_NAMESPACE};
use lib_transit::preferences::DEFAULT_STREET;
use lib_transit::retrieve::bootstrap::{DEFAULT_PAGE_URL, DEFAULT_SCRIPT_URL};
use lib_transit::retrieve::BootstrapConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default name of the JSON configuration file.
pub const CONFIG_FILE: &str = "server_board.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Live bus board server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "BOARD_PORT", help = "Port to listen on for HTTP queries.")]
    pub port: Option<u16>,

    #[clap(long, env = "BOARD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "BOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "BOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "BOARD_PAGE_URL", help = "City page carrying the feed credential.")]
    pub page_url: Option<String>,

    #[clap(long, env = "BOARD_SCRIPT_URL", help = "City script carrying the stop and line catalog.")]
    pub script_url: Option<String>,

    #[clap(long, env = "BOARD_FEED_URL", help = "Socket.IO host of the live feed.")]
    pub feed_url: Option<String>,

    #[clap(long, env = "BOARD_NAMESPACE", help = "Topic namespace of the live feed.")]
    pub namespace: Option<String>,

    #[clap(long, env = "BOARD_LINE_IDS", value_delimiter = ',', help = "Comma-separated vehicle line ids to subscribe to.")]
    pub line_ids: Option<Vec<String>>,

    #[clap(long, env = "BOARD_CREDENTIAL", help = "Feed credential; skips scraping the city page when set.")]
    pub credential: Option<String>,

    #[clap(long, env = "BOARD_CATALOG_SCRIPT_PATH", help = "Local copy of the city script, read instead of fetching it.")]
    pub catalog_script_path: Option<PathBuf>,

    #[clap(long, env = "BOARD_DEFAULT_STREET", help = "Street shown until the user picks one.")]
    pub default_street: Option<String>,

    #[clap(long, env = "BOARD_PREFERENCES_DIR", help = "Directory of the persisted board settings.")]
    pub preferences_dir: Option<PathBuf>,

    #[clap(long, env = "BOARD_BOOTSTRAP_TIMEOUT_SECONDS", help = "Seconds allowed for fetching the credential and catalog.")]
    pub bootstrap_timeout_seconds: Option<u64>,

    #[clap(long, env = "BOARD_HANDSHAKE_TIMEOUT_SECONDS", help = "Seconds allowed for the feed connection handshake.")]
    pub handshake_timeout_seconds: Option<u64>,

    #[clap(long, env = "BOARD_SILENT_FAILURE_TIMEOUT_SECONDS", help = "Seconds of feed silence before reconnecting.")]
    pub silent_failure_timeout_seconds: Option<u64>,

    #[clap(long, env = "BOARD_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for feed reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "BOARD_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for feed reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "BOARD_MAX_RECONNECT_ATTEMPTS", help = "Give up after this many consecutive failed reconnects (unlimited when unset).")]
    pub max_reconnect_attempts: Option<u32>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            page_url: other.page_url.or(self.page_url),
            script_url: other.script_url.or(self.script_url),
            feed_url: other.feed_url.or(self.feed_url),
            namespace: other.namespace.or(self.namespace),
            line_ids: other.line_ids.or(self.line_ids),
            credential: other.credential.or(self.credential),
            catalog_script_path: other.catalog_script_path.or(self.catalog_script_path),
            default_street: other.default_street.or(self.default_street),
            preferences_dir: other.preferences_dir.or(self.preferences_dir),
            bootstrap_timeout_seconds: other.bootstrap_timeout_seconds.or(self.bootstrap_timeout_seconds),
            handshake_timeout_seconds: other.handshake_timeout_seconds.or(self.handshake_timeout_seconds),
            silent_failure_timeout_seconds: other.silent_failure_timeout_seconds.or(self.silent_failure_timeout_seconds),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
        }
    }

    /// Built-in values for every key that has a default.
    pub fn defaults() -> Config {
        Config {
            port: Some(9003),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            page_url: Some(DEFAULT_PAGE_URL.to_string()),
            script_url: Some(DEFAULT_SCRIPT_URL.to_string()),
            feed_url: Some(DEFAULT_ENDPOINT.to_string()),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            line_ids: Some(DEFAULT_LINE_IDS.iter().map(|id| id.to_string()).collect()),
            default_street: Some(DEFAULT_STREET.to_string()),
            bootstrap_timeout_seconds: Some(30),
            handshake_timeout_seconds: Some(15),
            silent_failure_timeout_seconds: Some(60),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(60000),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(9003)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn default_street(&self) -> &str {
        self.default_street.as_deref().unwrap_or(DEFAULT_STREET)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_seconds.unwrap_or(30))
    }

    /// Where the bootstrap reads the credential and catalog from.
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        let defaults = BootstrapConfig::default();
        BootstrapConfig {
            page_url: self.page_url.clone().unwrap_or(defaults.page_url),
            script_url: self.script_url.clone().unwrap_or(defaults.script_url),
            credential: self.credential.clone(),
            script_path: self.catalog_script_path.clone(),
            ..defaults
        }
    }

    /// Feed session parameters for an authenticated `credential`.
    pub fn session_config(&self, credential: String) -> SessionConfig {
        let mut session = SessionConfig::new(credential);
        if let Some(endpoint) = &self.feed_url {
            session.endpoint = endpoint.clone();
        }
        if let Some(namespace) = &self.namespace {
            session.namespace = namespace.clone();
        }
        if let Some(line_ids) = &self.line_ids {
            session.line_ids = line_ids.clone();
        }
        if let Some(secs) = self.handshake_timeout_seconds {
            session.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.silent_failure_timeout_seconds {
            session.silent_timeout = Duration::from_secs(secs);
        }
        session.backoff = Backoff::new(
            Duration::from_millis(self.reconnect_base_delay_ms.unwrap_or(1000)),
            Duration::from_millis(self.reconnect_max_delay_ms.unwrap_or(60000)),
        );
        session.max_reconnect_attempts = self.max_reconnect_attempts;
        session
    }
}

fn load_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }

    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, the config file and `cli` (which already includes
/// environment variables), later layers winning.
pub fn load_config_with(cli: Config) -> Config {
    let config_file_path = cli.config_path.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = load_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    // .env values become visible to clap's `env` lookups
    dotenvy::dotenv().ok();
    load_config_with(Config::parse())
}
