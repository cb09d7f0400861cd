use crate::UnivfsError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "univfs.toml";
const DEFAULT_COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Login/password stored for a realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub login: String,
    #[serde(default)]
    pub password: String,
}

/// Virtual file system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Directory for temporary files (system temp dir when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Buffer size used by stream copies
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Enabled archive formats, most specific first. Empty means every
    /// built-in format in its default order.
    #[serde(default)]
    pub archive_formats: Vec<String>,

    /// Credentials keyed by realm URL (e.g. "sftp://host/")
    #[serde(default)]
    pub credentials: BTreeMap<String, StoredCredentials>,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

fn default_copy_buffer_size() -> usize {
    DEFAULT_COPY_BUFFER_SIZE
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            archive_formats: Vec::new(),
            credentials: BTreeMap::new(),
            portable_mode: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: VfsConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, UnivfsError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    let mut loaded = load_config_from(&path)?;
    loaded.portable = portable;
    loaded.config.portable_mode = portable;
    Ok(loaded)
}

/// Loads the config at `path`, falling back to defaults when it does not exist
pub fn load_config_from(path: &Path) -> Result<LoadedConfig, UnivfsError> {
    let exists = path.exists();

    let config = if exists {
        let data = fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| UnivfsError::Serialization(e.to_string()))?
    } else {
        VfsConfig::default()
    };

    if config.copy_buffer_size == 0 {
        return Err(UnivfsError::Config(
            "copy_buffer_size must be greater than zero".to_string(),
        ));
    }

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        exists,
        portable: false,
    })
}

pub fn ensure_config(prefer_portable: bool) -> Result<LoadedConfig, UnivfsError> {
    let loaded = load_config(prefer_portable)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &VfsConfig) -> Result<(), UnivfsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data =
        toml::to_string_pretty(config).map_err(|e| UnivfsError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

/// Temp directory to use for `config`: the configured one or the system's
pub fn default_temp_dir(config: &VfsConfig) -> PathBuf {
    config.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), UnivfsError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "univfs", "univfs")
        .ok_or_else(|| UnivfsError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
