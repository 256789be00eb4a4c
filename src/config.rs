use crate::discovery::{DiscoveryConfig, DEFAULT_DEBOUNCE};
use crate::tmdb::TMDB_BASE;
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const DEFAULT_BIND: &str = "0.0.0.0:3146";
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub discovery: DiscoveryConfig,
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tmdb_api_key = match get("TMDB_API_KEY") {
            Some(key) => key,
            None => anyhow::bail!("Missing required environment variable: TMDB_API_KEY"),
        };
        let tmdb_base_url = get("TMDB_BASE_URL").unwrap_or_else(|| TMDB_BASE.to_string());

        let debounce = match get("CINEVIBE_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("CINEVIBE_DEBOUNCE_MS is not a number: {raw}"))?,
            ),
            None => DEFAULT_DEBOUNCE,
        };

        let data_dir = PathBuf::from(
            get("CINEVIBE_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );

        let bind_raw = get("CINEVIBE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse()
            .with_context(|| format!("CINEVIBE_BIND is not a socket address: {bind_raw}"))?;

        info!(
            "Config loaded: catalog={}, debounce={:?}, data_dir={:?}, bind={}",
            tmdb_base_url, debounce, data_dir, bind
        );
        Ok(Self {
            tmdb_api_key,
            tmdb_base_url,
            discovery: DiscoveryConfig { debounce },
            data_dir,
            bind,
        })
    }
}
