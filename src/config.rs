use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::{CATALOG_BASE, CATALOG_SIZE};
use crate::pipeline::MIN_LOADING;

const DEFAULT_ENV_PREFIX: &str = "POKEDEX_TUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub loading: LoadingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            size: default_size(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    CATALOG_BASE.to_string()
}

fn default_user_agent() -> String {
    format!("pokedex-tui/{}", crate::VERSION)
}

fn default_size() -> u32 {
    CATALOG_SIZE
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadingConfig {
    #[serde(default = "default_min_duration", with = "humantime_serde")]
    pub min_duration: Duration,
    #[serde(default = "default_preload_timeout", with = "humantime_serde")]
    pub preload_timeout: Duration,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            min_duration: default_min_duration(),
            preload_timeout: default_preload_timeout(),
        }
    }
}

fn default_min_duration() -> Duration {
    MIN_LOADING
}

fn default_preload_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(
            path.exists(),
            "config: file {} does not exist",
            path.display()
        );
        cfg = merge_config(cfg, read_config_file(path)?);
    } else if let Some(default_path) = default_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.catalog.base_url.trim().is_empty() {
        base.catalog.base_url = other.catalog.base_url;
    }
    if !other.catalog.user_agent.trim().is_empty() {
        base.catalog.user_agent = other.catalog.user_agent;
    }
    base.catalog.size = other.catalog.size;
    if !other.catalog.timeout.is_zero() {
        base.catalog.timeout = other.catalog.timeout;
    }

    base.loading.min_duration = other.loading.min_duration;
    if !other.loading.preload_timeout.is_zero() {
        base.loading.preload_timeout = other.loading.preload_timeout;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "catalog.base_url" => cfg.catalog.base_url = value,
        "catalog.user_agent" => cfg.catalog.user_agent = value,
        "catalog.size" => {
            if let Ok(parsed) = value.trim().parse::<u32>() {
                cfg.catalog.size = parsed;
            }
        }
        "catalog.timeout" => {
            if let Ok(duration) = humantime::parse_duration(value.trim()) {
                cfg.catalog.timeout = duration;
            }
        }
        "loading.min_duration" => {
            if let Ok(duration) = humantime::parse_duration(value.trim()) {
                cfg.loading.min_duration = duration;
            }
        }
        "loading.preload_timeout" => {
            if let Ok(duration) = humantime::parse_duration(value.trim()) {
                cfg.loading.preload_timeout = duration;
            }
        }
        _ => {}
    }
}

fn validate(cfg: &Config) -> Result<()> {
    let url = Url::parse(&cfg.catalog.base_url)
        .with_context(|| format!("config: invalid catalog.base_url {:?}", cfg.catalog.base_url))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "config: catalog.base_url must be http or https"
    );
    anyhow::ensure!(cfg.catalog.size > 0, "config: catalog.size must be positive");
    anyhow::ensure!(
        !cfg.catalog.user_agent.trim().is_empty(),
        "config: catalog.user_agent is required"
    );
    Ok(())
}

/// Where `load` looks for a config file when none is given explicitly.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pokedex-tui").join("config.yaml"))
}
