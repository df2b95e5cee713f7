//! Configuration file and path resolution.
//!
//! Precedence, lowest first: built-in defaults, the YAML file
//! (`~/.utask/config.yaml` unless overridden), environment variables, flags.
//! Environment and flags reach us already merged by clap, as [`Overrides`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use utask::store::DEFAULT_MAX_CAS_ATTEMPTS;
use utask::validate::DEFAULT_NAMESPACE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub substrate: SubstrateConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// SQLite database file shared by all clients.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub profile: Option<String>,
    pub max_cas_attempts: Option<u32>,
}

/// Values from the environment or command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<String>,
    pub profile: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: String,
    pub profile: String,
    pub max_cas_attempts: u32,
}

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home))
}

/// `~/.utask/config.yaml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".utask").join("config.yaml"))
}

/// `~/.utask/utask.db`
pub fn default_db_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".utask").join("utask.db"))
}

/// Expand a leading `~/` against `$HOME`.
fn expand_home(path: &str) -> Result<String> {
    match path.strip_prefix("~/") {
        Some(rest) => path_to_string(&home_dir()?.join(rest)),
        None => Ok(path.to_string()),
    }
}

fn path_to_string(path: &Path) -> Result<String> {
    Ok(path
        .to_str()
        .with_context(|| format!("path {} is not valid UTF-8", path.display()))?
        .to_string())
}

/// Read the config file. A missing file yields the default config.
pub fn load_from_file(path: &Path) -> Result<Config> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

impl Config {
    pub fn resolve(self, overrides: Overrides) -> Result<Settings> {
        let db_path = match overrides.db.or(self.substrate.path) {
            Some(p) => expand_home(&p)?,
            None => path_to_string(&default_db_path()?)?,
        };
        let nonblank = |p: &String| !p.trim().is_empty();
        let profile = overrides
            .profile
            .filter(nonblank)
            .or(self.store.profile.filter(nonblank))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let max_cas_attempts = self
            .store
            .max_cas_attempts
            .unwrap_or(DEFAULT_MAX_CAS_ATTEMPTS)
            .max(1);
        Ok(Settings {
            db_path,
            profile,
            max_cas_attempts,
        })
    }
}

/// Load the config at `path` (or the default location) and apply overrides.
pub fn load(path: Option<&str>, overrides: Overrides) -> Result<Settings> {
    let path = match path {
        Some(p) => PathBuf::from(expand_home(p)?),
        None => default_config_path()?,
    };
    load_from_file(&path)?.resolve(overrides)
}
