//! Point-to-point distance and travel-time estimation.
//!
//! Approximates road distance without an external routing call: a grid
//! estimate for short hops, great-circle for long ones, linearly blended in
//! between, inflated by a road factor that grows with distance.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DistanceConfig;
use crate::domains::geo::cache::TtlCache;
use crate::domains::geo::types::GeoPoint;

/// Kilometers per degree of latitude (and of longitude at the equator).
const KM_PER_DEGREE: f64 = 111.32;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this separation the grid estimate dominates.
const GRID_ONLY_KM: f64 = 2.0;

/// Above this separation the great-circle estimate dominates.
const GREAT_CIRCLE_ONLY_KM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadType {
    City,
    Highway,
    Residential,
}

impl Default for RoadType {
    fn default() -> Self {
        RoadType::City
    }
}

pub struct DistanceEstimator {
    config: DistanceConfig,
    pair_cache: TtlCache<String, f64>,
}

impl DistanceEstimator {
    pub fn new(config: DistanceConfig) -> Self {
        let ttl = Duration::hours(config.pair_cache_ttl_hours);
        Self {
            config,
            pair_cache: TtlCache::new(ttl),
        }
    }

    /// Estimated road distance in kilometers. Deterministic for fixed inputs.
    pub fn distance(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        let straight = Self::great_circle_km(a, b);
        let base = if straight < GRID_ONLY_KM {
            Self::grid_km(a, b)
        } else if straight > GREAT_CIRCLE_ONLY_KM {
            straight
        } else {
            let t = (straight - GRID_ONLY_KM) / (GREAT_CIRCLE_ONLY_KM - GRID_ONLY_KM);
            Self::grid_km(a, b) * (1.0 - t) + straight * t
        };
        base * Self::road_factor(base)
    }

    /// Travel time in minutes for a distance at the given road type, with a
    /// capped per-km buffer for stops and turns.
    pub fn travel_time(&self, distance_km: f64, road_type: RoadType) -> f64 {
        let speed_kmh = match road_type {
            RoadType::City => self.config.city_speed_kmh,
            RoadType::Highway => self.config.highway_speed_kmh,
            RoadType::Residential => self.config.residential_speed_kmh,
        };
        let driving_min = distance_km / speed_kmh * 60.0;
        let buffer_min = (distance_km * self.config.per_km_buffer_min).min(self.config.buffer_cap_min);
        driving_min + buffer_min
    }

    /// Memoized distance between two points, keyed by the unordered pair.
    pub fn pair_distance(&self, a: GeoPoint, b: GeoPoint, now: DateTime<Utc>) -> f64 {
        let key = Self::pair_key(a, b);
        if let Some(cached) = self.pair_cache.get(&key, now) {
            return cached;
        }
        let distance = self.distance(a, b);
        self.pair_cache.insert(key, distance, now);
        distance
    }

    /// Full N x N matrix in the input order, reusing the pairwise cache.
    pub fn build_matrix(&self, coords: &[GeoPoint], now: DateTime<Utc>) -> Vec<Vec<f64>> {
        let n = coords.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    matrix[i][j] = self.pair_distance(coords[i], coords[j], now);
                }
            }
        }
        matrix
    }

    pub fn cached_pairs(&self) -> usize {
        self.pair_cache.len()
    }

    /// Grid-style estimate: lat/lon deltas walked separately, longitude
    /// compressed by latitude.
    fn grid_km(a: GeoPoint, b: GeoPoint) -> f64 {
        let mid_lat = ((a.lat + b.lat) / 2.0).to_radians();
        let lat_km = (b.lat - a.lat).abs() * KM_PER_DEGREE;
        let lon_km = (b.lon - a.lon).abs() * KM_PER_DEGREE * mid_lat.cos();
        lat_km + lon_km
    }

    fn great_circle_km(a: GeoPoint, b: GeoPoint) -> f64 {
        let lat1 = a.lat.to_radians();
        let lat2 = b.lat.to_radians();
        let delta_lat = (b.lat - a.lat).to_radians();
        let delta_lon = (b.lon - a.lon).to_radians();

        let h = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * h.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Inflation approximating real road routing: 1.1 for short trips rising
    /// to 1.3 at 50 km and beyond.
    fn road_factor(base_km: f64) -> f64 {
        1.1 + 0.2 * (base_km / 50.0).min(1.0)
    }

    fn pair_key(a: GeoPoint, b: GeoPoint) -> String {
        let (first, second) = if (a.lat, a.lon) <= (b.lat, b.lon) {
            (a, b)
        } else {
            (b, a)
        };
        format!("{}|{}", first.key(), second.key())
    }
}
