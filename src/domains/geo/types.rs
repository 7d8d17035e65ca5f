use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Stable cache key with ~0.1m precision.
    pub fn key(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lon)
    }
}

/// How much we trust a geocoded coordinate, derived from the provider's
/// confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyTier {
    High,
    Medium,
    Low,
}

impl AccuracyTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            AccuracyTier::High
        } else if confidence >= 0.5 {
            AccuracyTier::Medium
        } else {
            AccuracyTier::Low
        }
    }
}

/// A ranked match returned by a geocoding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub point: GeoPoint,
    /// Provider confidence/importance score, 0.0..=1.0.
    pub confidence: f64,
    pub display_name: String,
    pub locality: Option<String>,
}

/// The resolved coordinate kept in the geocode cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub point: GeoPoint,
    pub accuracy: AccuracyTier,
    pub confidence: f64,
    pub locality: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

/// Per-address outcome of a batch resolution.
#[derive(Debug, Clone)]
pub struct BatchResolution {
    pub address: String,
    pub result: Option<GeocodeResult>,
    pub from_cache: bool,
}
