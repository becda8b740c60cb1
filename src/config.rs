use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::nav::{DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY};
use crate::scan::{DEFAULT_FEED_CAP, DEFAULT_MIN_CONTENT_LEN};

const DEFAULT_ENV_PREFIX: &str = "ECHOBREAK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub nav: NavConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_backend_url() -> String {
    crate::backend::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    "echobreak/0.1 (+https://github.com/echobreak/echobreak)".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentConfig {
    #[serde(default = "default_content_url")]
    pub base_url: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: default_content_url(),
        }
    }
}

fn default_content_url() -> String {
    crate::content::DEFAULT_CONTENT_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    #[serde(default = "default_feed_cap")]
    pub feed_cap: usize,
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            feed_cap: default_feed_cap(),
            min_content_len: default_min_content_len(),
        }
    }
}

fn default_feed_cap() -> usize {
    DEFAULT_FEED_CAP
}

fn default_min_content_len() -> usize {
    DEFAULT_MIN_CONTENT_LEN
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavConfig {
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            settle_delay: default_settle_delay(),
        }
    }
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    #[serde(default = "default_port_start")]
    pub port_start: u16,
    #[serde(default = "default_port_count")]
    pub port_count: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port_start: default_port_start(),
            port_count: default_port_count(),
        }
    }
}

fn default_port_start() -> u16 {
    crate::dashboard::DEFAULT_PORT_START
}

fn default_port_count() -> u16 {
    crate::dashboard::DEFAULT_PORT_COUNT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// 0 disables the companion listener.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_control_enabled")]
    pub enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: 0,
            enabled: default_control_enabled(),
        }
    }
}

fn default_control_enabled() -> bool {
    false
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

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
    if !other.backend.base_url.is_empty() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }

    if !other.content.base_url.is_empty() {
        base.content.base_url = other.content.base_url;
    }

    if other.scan.feed_cap != 0 {
        base.scan.feed_cap = other.scan.feed_cap;
    }
    if other.scan.min_content_len != 0 {
        base.scan.min_content_len = other.scan.min_content_len;
    }

    if other.nav.poll_interval != default_poll_interval() {
        base.nav.poll_interval = other.nav.poll_interval;
    }
    if other.nav.settle_delay != default_settle_delay() {
        base.nav.settle_delay = other.nav.settle_delay;
    }

    if other.dashboard.port_start != 0 {
        base.dashboard.port_start = other.dashboard.port_start;
    }
    if other.dashboard.port_count != 0 {
        base.dashboard.port_count = other.dashboard.port_count;
    }

    if other.control.port != 0 {
        base.control.port = other.control.port;
    }
    if other.control.enabled {
        base.control.enabled = true;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "content.base_url" => cfg.content.base_url = value,
        "scan.feed_cap" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.scan.feed_cap = parsed;
            }
        }
        "scan.min_content_len" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.scan.min_content_len = parsed;
            }
        }
        "nav.poll_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.nav.poll_interval = duration;
            }
        }
        "nav.settle_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.nav.settle_delay = duration;
            }
        }
        "dashboard.port_start" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.dashboard.port_start = parsed;
            }
        }
        "dashboard.port_count" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.dashboard.port_count = parsed;
            }
        }
        "control.port" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.control.port = parsed;
            }
        }
        "control.enabled" => {
            cfg.control.enabled = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("echobreak").join("config.yaml"))
}
