//! Server configuration: an optional JSON file overridden by CLI flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;
use pfftdb_core::{EngineConfig, PrefixTable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(name = "pfftdb-server", version, about = "pfftdb named-graph triple store over HTTP/JSON")]
pub struct Args {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Graph to create at startup (repeatable).
    #[arg(long = "graph")]
    pub graphs: Vec<String>,

    /// Graph lock timeout in milliseconds.
    #[arg(long)]
    pub lock_timeout_ms: Option<u64>,

    /// Geocoding endpoint; enables the `geo` inference rule.
    #[arg(long)]
    pub geocoder_url: Option<String>,

    #[arg(long, env = "PFFTDB_GEOCODER_KEY")]
    pub geocoder_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Pause before every lookup.
    pub throttle_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key: None,
            throttle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub log_level: String,
    /// Graphs created at startup.
    pub graphs: Vec<String>,
    /// Prefixes available to every request; a request's own `prefix` wins.
    pub prefixes: PrefixTable,
    /// The `geo` rule is registered only when this is set.
    pub geocoder: Option<GeocoderConfig>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8181)),
            log_level: "info".to_string(),
            graphs: Vec::new(),
            prefixes: PrefixTable::new(),
            geocoder: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
    }

    /// File values (if any), then flag overrides.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(listen) = args.listen {
            config.listen = listen;
        }
        if let Some(level) = &args.log_level {
            config.log_level = level.clone();
        }
        for graph in &args.graphs {
            if !config.graphs.contains(graph) {
                config.graphs.push(graph.clone());
            }
        }
        if let Some(ms) = args.lock_timeout_ms {
            config.engine.lock_timeout_ms = ms;
        }
        if let Some(url) = &args.geocoder_url {
            config.geocoder.get_or_insert_with(GeocoderConfig::default).base_url = url.clone();
        }
        if let Some(key) = &args.geocoder_key {
            if let Some(geocoder) = config.geocoder.as_mut() {
                geocoder.api_key = Some(key.clone());
            }
        }
        Ok(config)
    }
}
