use famtree_vision::VisionConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_UPLOAD_IDLE_SECS: u64 = 30 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid bind address {0:?}")]
    Bind(String),
}

/// Optional TOML file named by `FAMTREE_CONFIG`. Environment variables take
/// precedence over every key.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub public_url: Option<String>,
    pub vision_api_key: Option<String>,
    pub vision_endpoint: Option<String>,
    pub vision_timeout_secs: Option<u64>,
    pub vision_max_results: Option<u32>,
    pub rejection_display_secs: Option<u64>,
    pub upload_idle_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
    pub cookie_secure: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:8080).
    pub bind: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory holding uploaded image binaries.
    pub media_dir: PathBuf,
    /// Base URL clients reach the service at; photo URLs are built from it.
    pub public_url: String,
    pub vision: VisionConfig,
    /// How long a rejected upload stays on display.
    pub rejection_display: Duration,
    /// Untouched upload workflows, and the images they hold, are dropped
    /// after this long.
    pub upload_idle: Duration,
    /// Request body limit, applied to every route.
    pub max_upload_bytes: usize,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
}

impl Config {
    /// Load configuration from `FAMTREE_*` environment variables, layered
    /// over the file named by `FAMTREE_CONFIG` if set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("FAMTREE_CONFIG") {
            Ok(path) => FileConfig::load(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Self::resolve(|key| std::env::var(key).ok(), file)
    }

    pub fn resolve(
        env: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self, ConfigError> {
        let bind_raw = env("FAMTREE_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Bind(bind_raw))?;

        let data_dir = env("FAMTREE_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&env));

        let db_path = env("FAMTREE_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("famtree.db"));

        let media_dir = env("FAMTREE_MEDIA_DIR")
            .map(PathBuf::from)
            .or(file.media_dir)
            .unwrap_or_else(|| data_dir.join("media"));

        let public_url = env("FAMTREE_PUBLIC_URL")
            .or(file.public_url)
            .unwrap_or_else(|| format!("http://{bind}"))
            .trim_end_matches('/')
            .to_string();

        let defaults = VisionConfig::default();
        let vision = VisionConfig {
            endpoint: env("FAMTREE_VISION_ENDPOINT")
                .or(file.vision_endpoint)
                .unwrap_or(defaults.endpoint),
            api_key: env("GOOGLE_CLOUD_VISION_API_KEY")
                .or(file.vision_api_key)
                .filter(|k| !k.is_empty()),
            max_results: parsed(&env, "FAMTREE_VISION_MAX_RESULTS")
                .or(file.vision_max_results)
                .unwrap_or(defaults.max_results),
            timeout: parsed(&env, "FAMTREE_VISION_TIMEOUT_SECS")
                .or(file.vision_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        Ok(Self {
            bind,
            db_path,
            media_dir,
            public_url,
            vision,
            rejection_display: Duration::from_secs(
                parsed(&env, "FAMTREE_REJECTION_DISPLAY_SECS")
                    .or(file.rejection_display_secs)
                    .unwrap_or(3),
            ),
            upload_idle: Duration::from_secs(
                parsed(&env, "FAMTREE_UPLOAD_IDLE_SECS")
                    .or(file.upload_idle_secs)
                    .unwrap_or(DEFAULT_UPLOAD_IDLE_SECS),
            ),
            max_upload_bytes: parsed(&env, "FAMTREE_MAX_UPLOAD_BYTES")
                .or(file.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            cookie_secure: env("FAMTREE_COOKIE_SECURE")
                .map(|v| v != "0" && v != "false")
                .or(file.cookie_secure)
                .unwrap_or(false),
        })
    }

    /// Base URL under which stored binaries are served.
    pub fn media_url(&self) -> String {
        format!("{}/media", self.public_url)
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("famtree")
}

/// Unparseable values fall back to the default.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}
