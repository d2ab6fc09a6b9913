//! Runtime configuration: defaults, then `tsfeed.toml`, then `TSFEED_*` env vars.

use crate::error::{SignalError, SignalResult};
use crate::utils::add_ice_url_scheme;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_CONFIG_FILE: &str = "tsfeed.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Directory holding `index.html` and `client.js`
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// 0 waits for ICE gathering forever
    #[serde(default = "default_gather_timeout_secs")]
    pub gather_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_stun_urls() -> Vec<String> {
    vec![DEFAULT_STUN_URL.to_string()]
}

fn default_gather_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            asset_dir: default_asset_dir(),
            stun_urls: default_stun_urls(),
            gather_timeout_secs: default_gather_timeout_secs(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load from the config file named by `TSFEED_CONFIG` (or `tsfeed.toml`) and the environment.
    pub fn load() -> SignalResult<Self> {
        let _ = dotenvy::dotenv();
        let path =
            std::env::var("TSFEED_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_sources(config::File::with_name(&path).required(false))
    }

    pub fn from_sources<S>(file: S) -> SignalResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let cfg: AppConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("TSFEED")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("stun_urls")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        cfg.validated()
    }

    /// Normalise STUN urls; fails on an empty list or on relay urls.
    pub fn validated(mut self) -> SignalResult<Self> {
        if self.stun_urls.is_empty() {
            return Err(SignalError::Config(
                "at least one STUN server is required".into(),
            ));
        }
        self.stun_urls = self
            .stun_urls
            .iter()
            .map(|u| add_ice_url_scheme(u))
            .collect::<SignalResult<Vec<_>>>()?;
        Ok(self)
    }

    pub fn gather_timeout(&self) -> Option<Duration> {
        match self.gather_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
