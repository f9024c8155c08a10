use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub fake: FakeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port the local announce endpoint listens on
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Announce URL written into rewritten torrent files
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Directory scanned for .torrent files at startup
    #[serde(default = "default_torrent_dir")]
    pub torrent_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Port reported to the upstream tracker; ideally the one the real
    /// BT client listens on
    #[serde(default = "default_client_port")]
    pub port: u16,
    /// Client identification sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_numwant")]
    pub numwant: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FakeConfig {
    /// Synthetic bytes "downloaded" per announce tick
    #[serde(default = "default_base_rate")]
    pub base_rate: u64,
    /// Range the per-session rate ceiling is drawn from
    #[serde(default = "default_rate_floor")]
    pub session_rate_floor: u64,
    #[serde(default = "default_rate_ceiling")]
    pub session_rate_ceiling: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_server_port() -> u16 {
    1088
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_public_url() -> String {
    "http://127.0.0.1:1088/announce".to_string()
}

fn default_torrent_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_client_port() -> u16 {
    17673
}

fn default_user_agent() -> String {
    "qBittorrent/5.0.2".to_string()
}

fn default_numwant() -> u32 {
    200
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_base_rate() -> u64 {
    512 * 1024 // 512 KiB per tick
}

fn default_rate_floor() -> u64 {
    512 * 1024
}

fn default_rate_ceiling() -> u64 {
    5120 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            num_threads: default_num_threads(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            torrent_dir: default_torrent_dir(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_client_port(),
            user_agent: default_user_agent(),
            numwant: default_numwant(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            base_rate: default_base_rate(),
            session_rate_floor: default_rate_floor(),
            session_rate_ceiling: default_rate_ceiling(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Load from file if it exists, otherwise use built-in defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("server.num_threads must be greater than 0");
        }

        if !self.proxy.public_url.starts_with("http://")
            && !self.proxy.public_url.starts_with("https://")
        {
            bail!(
                "proxy.public_url must be an http(s) URL, got '{}'",
                self.proxy.public_url
            );
        }

        if self.client.port == 0 {
            bail!("client.port must be greater than 0");
        }

        if self.client.numwant == 0 {
            bail!("client.numwant must be greater than 0");
        }

        if self.upstream.timeout_secs == 0 {
            bail!("upstream.timeout_secs must be greater than 0");
        }

        if self.fake.base_rate == 0 {
            bail!("fake.base_rate must be greater than 0");
        }

        if self.fake.session_rate_floor == 0 {
            bail!("fake.session_rate_floor must be greater than 0");
        }

        if self.fake.session_rate_floor >= self.fake.session_rate_ceiling {
            bail!(
                "fake.session_rate_floor ({}) must be below fake.session_rate_ceiling ({})",
                self.fake.session_rate_floor,
                self.fake.session_rate_ceiling
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
