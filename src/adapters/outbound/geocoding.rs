//! Nominatim-style HTTP geocoding adapter.

use async_trait::async_trait;
use serde::Deserialize;

use crate::common::{DomainError, DomainResult};
use crate::config::GeocodingConfig;
use crate::domains::geo::{GeoPoint, GeocodeCandidate, GeocodeProvider};

pub struct NominatimGeocoder {
    config: GeocodingConfig,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: GeocodingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimGeocoder {
    async fn search(&self, address: &str) -> DomainResult<Vec<GeocodeCandidate>> {
        let url = format!("{}/search", self.config.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("q", address),
                ("format", "json"),
                ("limit", "5"),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    DomainError::TransientProvider { reason: e.to_string() }
                } else {
                    DomainError::Infrastructure(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DomainError::TransientProvider {
                reason: "geocoding provider rate limit".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(DomainError::Infrastructure(format!(
                "geocoding provider returned {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?;

        Ok(places.into_iter().filter_map(NominatimPlace::into_candidate).collect())
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    importance: Option<f64>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
}

impl NominatimPlace {
    fn into_candidate(self) -> Option<GeocodeCandidate> {
        let point = GeoPoint::new(self.lat.parse().ok()?, self.lon.parse().ok()?);
        let locality = self.address.and_then(|a| a.city.or(a.town).or(a.village).or(a.suburb));
        Some(GeocodeCandidate {
            point,
            confidence: self.importance.unwrap_or(0.3).clamp(0.0, 1.0),
            display_name: self.display_name,
            locality,
        })
    }
}
