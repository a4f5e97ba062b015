use crate::error::ConfigError;
use config::{Environment, File, Map};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Minimum length of a configured session secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "grocerz";

/// Prefix for environment overrides, e.g. `GROCERZ_DATA_PATH`.
pub const ENV_PREFIX: &str = "GROCERZ";

pub const DEFAULT_AISLES: [&str; 12] = [
    "Aisle 1", "Aisle 2", "Aisle 3", "Aisle 4", "Aisle 5", "Aisle 6", "Aisle 7", "Aisle 8",
    "Aisle 9", "Aisle 10", "Freezer", "Produce",
];

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// Location of the inventory spreadsheet.
    pub data_path: PathBuf,

    /// Key material for signing session cookies. When unset a random key is
    /// generated and sessions do not survive a restart.
    #[serde(default)]
    pub session_secret: Option<String>,

    pub bind_addr: String,

    /// Absolute base URL used in QR links, e.g. `http://192.168.1.20:5000`.
    /// Falls back to the request's `Host` header.
    #[serde(default)]
    pub public_url: Option<String>,

    pub static_dir: PathBuf,
    pub session_ttl_secs: u64,
    pub max_upload_bytes: usize,

    /// Aisle labels shown on the store map.
    pub aisles: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: PathBuf::from("data").join("inventory.xlsx"),
            session_secret: None,
            bind_addr: "127.0.0.1:5000".to_string(),
            public_url: None,
            static_dir: PathBuf::from("static"),
            session_ttl_secs: crate::session::SESSION_DURATION_SECS,
            max_upload_bytes: 10 * 1024 * 1024,
            aisles: DEFAULT_AISLES.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Config {
    /// Layer defaults, an optional config file and `GROCERZ_*` environment
    /// variables.
    ///
    /// With `file = None` a `grocerz.{toml,json,yaml,...}` in the working
    /// directory is used if present. An explicit file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, None)
    }

    /// Like [`Config::load`], reading overrides from `vars` instead of the
    /// process environment when given. List values such as
    /// `GROCERZ_AISLES=Dairy,Bakery` are comma separated.
    pub fn load_with_env(
        file: Option<&Path>,
        vars: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .set_default("data_path", defaults.data_path.to_string_lossy().as_ref())?
            .set_default("bind_addr", defaults.bind_addr.as_str())?
            .set_default("static_dir", defaults.static_dir.to_string_lossy().as_ref())?
            .set_default("session_ttl_secs", defaults.session_ttl_secs)?
            .set_default("max_upload_bytes", defaults.max_upload_bytes as u64)?
            .set_default("aisles", defaults.aisles.clone())?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("aisles")
                    .source(vars),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secret) = &self.session_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::SecretTooShort {
                    min: MIN_SECRET_LEN,
                    len: secret.len(),
                });
            }
        }
        Ok(())
    }

    /// `public_url` without a trailing slash, if configured.
    pub fn public_root(&self) -> Option<&str> {
        self.public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}
