use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pfftdb_server::{server, Args, ServerConfig};

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    server::run(config)
}
