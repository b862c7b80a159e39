//! HTTP geocoder for the `geo` inference rule (Google Geocoding API shape).

use pfftdb_core::{Coordinates, GeocodeError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    /// First result's location, or the service status as an error.
    pub(crate) fn into_coordinates(self) -> Result<Coordinates, GeocodeError> {
        match self.status.as_str() {
            "OK" => self
                .results
                .into_iter()
                .next()
                .map(|r| Coordinates {
                    lat: r.geometry.location.lat,
                    lng: r.geometry.location.lng,
                })
                .ok_or(GeocodeError::NoResults),
            "ZERO_RESULTS" => Err(GeocodeError::NoResults),
            "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(GeocodeError::OverQueryLimit),
            other => Err(GeocodeError::Request(format!("status {other}"))),
        }
    }
}

#[cfg(feature = "geocode-http")]
pub use http::HttpGeocoder;

#[cfg(feature = "geocode-http")]
mod http {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use pfftdb_core::{Coordinates, GeocodeError, Geocoder};
    use url::Url;

    use super::GeocodeResponse;
    use crate::config::GeocoderConfig;

    /// Blocking client; call it from a blocking context.
    pub struct HttpGeocoder {
        client: reqwest::blocking::Client,
        base_url: Url,
        api_key: Option<String>,
        throttle: Duration,
    }

    impl HttpGeocoder {
        pub fn new(config: &GeocoderConfig) -> Result<Self> {
            let base_url = Url::parse(&config.base_url)
                .map_err(|e| anyhow!("invalid geocoder url `{}`: {e}", config.base_url))?;
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| anyhow!("failed to build geocoder client: {e}"))?;
            Ok(Self {
                client,
                base_url,
                api_key: config.api_key.clone(),
                throttle: Duration::from_millis(config.throttle_ms),
            })
        }

        fn url_for(&self, address: &str) -> Url {
            let mut url = self.base_url.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("address", address);
                if let Some(key) = &self.api_key {
                    query.append_pair("key", key);
                }
            }
            url
        }
    }

    impl Geocoder for HttpGeocoder {
        fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeError> {
            if !self.throttle.is_zero() {
                std::thread::sleep(self.throttle);
            }
            let response = self
                .client
                .get(self.url_for(address))
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| GeocodeError::Request(e.to_string()))?;
            let body: GeocodeResponse = response
                .json()
                .map_err(|e| GeocodeError::Request(format!("bad response body: {e}")))?;
            body.into_coordinates()
        }
    }

}
