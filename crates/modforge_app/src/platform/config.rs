use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use forge_logging::LogDestination;
use modforge_engine::{ApiSettings, PollSettings};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "modforge.ron";

/// Settings for one run. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub upload_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_max_elapsed_secs: u64,
    pub poll_max_failures: u32,
    pub poll_backoff_ceiling_ms: u64,
    pub log_file: Option<PathBuf>,
    pub auto_process: bool,
    pub auto_download: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let api = ApiSettings::default();
        let poll = PollSettings::default();
        Self {
            api_base_url: api.base_url,
            api_token: None,
            connect_timeout_ms: millis(api.connect_timeout),
            request_timeout_ms: millis(api.request_timeout),
            upload_timeout_secs: api.upload_timeout.as_secs(),
            poll_interval_ms: millis(poll.interval),
            poll_max_elapsed_secs: poll.max_elapsed.as_secs(),
            poll_max_failures: poll.max_consecutive_failures,
            poll_backoff_ceiling_ms: millis(poll.backoff_ceiling),
            log_file: None,
            auto_process: true,
            auto_download: true,
        }
    }
}

/// Configuration together with what loading it ran into. Loading happens
/// before the logger exists, so the caller reports these afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
    /// `MODFORGE_*` variables whose values were ignored.
    pub rejected_env: Vec<String>,
}

impl AppConfig {
    /// Reads `explicit` (which must exist) or, failing that, the default
    /// config file when present. Environment overrides are applied on top.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => fallback.is_file().then(|| fallback.to_path_buf()),
        };
        let config = match &source {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let (config, rejected_env) = config.with_env_overrides(|key| std::env::var(key).ok());
        Ok(LoadedConfig {
            config,
            source,
            rejected_env,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_ron_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_ron_str(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Applies `MODFORGE_*` variables. Values that do not parse are ignored
    /// and their keys returned.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> (Self, Vec<String>) {
        let mut rejected = Vec::new();
        if let Some(url) = lookup("MODFORGE_API_URL").filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(token) = lookup("MODFORGE_API_TOKEN") {
            let token = token.trim();
            self.api_token = (!token.is_empty()).then(|| token.to_string());
        }
        if let Some(value) = parse_env(&lookup, "MODFORGE_POLL_INTERVAL_MS", &mut rejected) {
            self.poll_interval_ms = value;
        }
        if let Some(value) = parse_env(&lookup, "MODFORGE_POLL_MAX_ELAPSED_SECS", &mut rejected) {
            self.poll_max_elapsed_secs = value;
        }
        (self, rejected)
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.api_base_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
            bearer_token: self.api_token.clone(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_elapsed: Duration::from_secs(self.poll_max_elapsed_secs),
            max_consecutive_failures: self.poll_max_failures.max(1),
            backoff_ceiling: Duration::from_millis(self.poll_backoff_ceiling_ms),
        }
    }

    pub fn log_destination(&self) -> LogDestination {
        match &self.log_file {
            Some(path) => LogDestination::File(path.clone()),
            None => LogDestination::Terminal,
        }
    }
}

/// A positive integer from `key`; anything else lands in `rejected`.
fn parse_env(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    rejected: &mut Vec<String>,
) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            rejected.push(key.to_string());
            None
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
