use std::{
    fmt, fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
};

use aptsrc_utils::path::{resolve_path, xdg_config_home};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    release::system_codename,
};

pub const DEFAULT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";
pub const DEFAULT_KEYS_DIR: &str = "/etc/apt/keyrings";
pub const DEFAULT_SYSTEM_SOURCE: &str = "system";

/// On-disk format used for newly created source files.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DefaultFormat {
    /// DEB822 stanzas in a `.sources` file
    #[default]
    Sources,
    /// One-line entries in a `.list` file
    List,
}

impl fmt::Display for DefaultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultFormat::Sources => write!(f, "sources"),
            DefaultFormat::List => write!(f, "list"),
        }
    }
}

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Directory scanned for `.list` and `.sources` files.
    /// Default: /etc/apt/sources.list.d
    pub sources_dir: Option<String>,

    /// Directory holding repository signing keys.
    /// Default: /etc/apt/keyrings
    pub keys_dir: Option<String>,

    /// File ident (stem) of the distribution's own source file.
    /// Default: "system"
    pub system_source: Option<String>,

    /// Format used when a new source file is created.
    /// Default: "sources"
    pub default_format: Option<DefaultFormat>,

    /// Suite used when an added repository doesn't name one.
    /// Default: the running system's codename
    pub default_suite: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("APTSRC_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("aptsrc").join("config.toml"),
    })
});

pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap();
    *global_config = Some(config);
    Ok(())
}

pub fn get_config() -> Config {
    {
        let config_guard = CONFIG.read().unwrap();
        if let Some(config) = config_guard.as_ref() {
            return config.clone();
        }
    }

    let mut config_guard = CONFIG.write().unwrap();
    config_guard.get_or_insert_with(Config::default).clone()
}

impl Config {
    /// Loads the configuration file, falling back to defaults when it doesn't exist.
    pub fn new() -> Result<Self> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "no config at {}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// A fully populated configuration, as written by `defconfig`.
    pub fn default_config() -> Self {
        Self {
            sources_dir: Some(DEFAULT_SOURCES_DIR.to_string()),
            keys_dir: Some(DEFAULT_KEYS_DIR.to_string()),
            system_source: Some(DEFAULT_SYSTEM_SOURCE.to_string()),
            default_format: Some(DefaultFormat::Sources),
            default_suite: Some(system_codename()),
        }
    }

    pub fn resolve(&mut self) -> Result<()> {
        let system = self.system_source.get_or_insert_with(|| DEFAULT_SYSTEM_SOURCE.to_string());
        if !is_valid_ident(system) {
            return Err(ConfigError::InvalidSystemSource(system.clone()));
        }

        self.default_format.get_or_insert_default();
        Ok(())
    }

    pub fn get_sources_dir(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("APTSRC_SOURCES_DIR") {
            return Ok(resolve_path(&env_path)?);
        }
        Ok(resolve_path(
            self.sources_dir.as_deref().unwrap_or(DEFAULT_SOURCES_DIR),
        )?)
    }

    pub fn get_keys_dir(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("APTSRC_KEYS_DIR") {
            return Ok(resolve_path(&env_path)?);
        }
        Ok(resolve_path(
            self.keys_dir.as_deref().unwrap_or(DEFAULT_KEYS_DIR),
        )?)
    }

    pub fn system_source(&self) -> &str {
        self.system_source.as_deref().unwrap_or(DEFAULT_SYSTEM_SOURCE)
    }

    pub fn default_format(&self) -> DefaultFormat {
        self.default_format.unwrap_or_default()
    }

    pub fn default_suite(&self) -> String {
        self.default_suite.clone().unwrap_or_else(system_codename)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = CONFIG_PATH.read().unwrap().to_path_buf();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&config_path, serialized)?;
        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}

pub fn generate_default_config() -> Result<()> {
    let config_path = CONFIG_PATH.read().unwrap().to_path_buf();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    Config::default_config().save()
}

fn is_valid_ident(ident: &str) -> bool {
    !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
