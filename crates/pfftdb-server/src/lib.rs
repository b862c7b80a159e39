//! pfftdb HTTP/JSON server.
//!
//! Exposes a [`pfftdb_core::Database`] under `/v1/*`. Handlers live in
//! [`api`] and are independent of the transport; [`server`] wires them into a
//! hyper HTTP/1 accept loop.

pub mod api;
pub mod config;
pub mod geocode;
pub mod server;

pub use api::{ApiError, AppState, Reply};
pub use config::{Args, GeocoderConfig, ServerConfig};
