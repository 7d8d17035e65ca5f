use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub geocoding: GeocodingConfig,
    pub distance: DistanceConfig,
    pub optimizer: OptimizerConfig,
    pub reoptimizer: ReoptimizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Process-wide minimum delay between external lookups, in milliseconds.
    pub min_request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub cache_ttl_days: i64,
    pub batch_size: usize,
    pub batch_item_delay_ms: u64,
    pub batch_pause_ms: u64,
    /// Center of the region used for deterministic fallback coordinates.
    pub default_center: [f64; 2],
    /// Half-width of the fallback region, in degrees.
    pub fallback_spread_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceConfig {
    pub city_speed_kmh: f64,
    pub highway_speed_kmh: f64,
    pub residential_speed_kmh: f64,
    /// Per-km buffer for stops and turns, in minutes.
    pub per_km_buffer_min: f64,
    /// Cap on the accumulated buffer, in minutes.
    pub buffer_cap_min: f64,
    pub pair_cache_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub max_stops: usize,
    pub timeout_secs: u64,
    /// Hybrid scored greedy only runs at or below this stop count.
    pub cluster_limit: usize,
    pub capacity_overload_factor: f64,
    pub working_hours_buffer_hours: i64,
    pub traffic_refresh_secs: u64,
    pub default_service_time_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReoptimizerConfig {
    pub cooldown_secs: i64,
    pub movement_threshold_km: f64,
    pub window_critical_min: i64,
    pub window_high_min: i64,
    pub low_fuel_threshold_pct: f64,
}

impl Config {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocoding: GeocodingConfig {
                base_url: "https://nominatim.openstreetmap.org".to_string(),
                user_agent: "shiftroute/0.2".to_string(),
                min_request_interval_ms: 1100,
                request_timeout_secs: 10,
                max_retries: 3,
                cache_ttl_days: 30,
                batch_size: 5,
                batch_item_delay_ms: 200,
                batch_pause_ms: 1000,
                default_center: [43.6532, -79.3832],
                fallback_spread_deg: 0.05,
            },
            distance: DistanceConfig {
                city_speed_kmh: 30.0,
                highway_speed_kmh: 80.0,
                residential_speed_kmh: 20.0,
                per_km_buffer_min: 0.5,
                buffer_cap_min: 10.0,
                pair_cache_ttl_hours: 24,
            },
            optimizer: OptimizerConfig {
                max_stops: 100,
                timeout_secs: 30,
                cluster_limit: 8,
                capacity_overload_factor: 1.2,
                working_hours_buffer_hours: 2,
                traffic_refresh_secs: 300,
                default_service_time_min: 5.0,
            },
            reoptimizer: ReoptimizerConfig {
                cooldown_secs: 120,
                movement_threshold_km: 0.5,
                window_critical_min: 30,
                window_high_min: 60,
                low_fuel_threshold_pct: 15.0,
            },
        }
    }
}
