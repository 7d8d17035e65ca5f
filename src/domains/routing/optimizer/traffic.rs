//! Pairwise traffic delay multipliers.
//!
//! The simulation stands in for a real traffic feed: swap the trait
//! implementation and optimization logic is untouched.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use crate::domains::geo::GeoPoint;

pub trait TrafficModel: Send + Sync {
    /// Delay multiplier (>= 1.0) applied to the travel time of one segment.
    fn multiplier(&self, from: GeoPoint, to: GeoPoint, distance_km: f64, now: DateTime<Utc>) -> f64;
}

/// No traffic. Useful in tests and as a neutral default.
pub struct FreeFlowTraffic;

impl TrafficModel for FreeFlowTraffic {
    fn multiplier(&self, _from: GeoPoint, _to: GeoPoint, _distance_km: f64, _now: DateTime<Utc>) -> f64 {
        1.0
    }
}

struct TrafficState {
    multipliers: HashMap<String, f64>,
    refreshed_at: DateTime<Utc>,
}

/// Synthesized pairwise multipliers: higher for longer segments, with seeded
/// per-segment jitter. Cached and refreshed at most once per interval.
pub struct SimulatedTraffic {
    refresh_interval: Duration,
    state: RwLock<TrafficState>,
}

impl SimulatedTraffic {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            state: RwLock::new(TrafficState {
                multipliers: HashMap::new(),
                refreshed_at: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    fn segment_key(from: GeoPoint, to: GeoPoint) -> String {
        format!("{}>{}", from.key(), to.key())
    }

    /// Deterministic per segment and refresh window.
    fn synthesize(key: &str, distance_km: f64, epoch: i64) -> f64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        epoch.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let length_load = (distance_km / 50.0).min(1.0) * 0.25;
        1.0 + length_load + rng.gen_range(0.0..0.15)
    }
}

impl TrafficModel for SimulatedTraffic {
    fn multiplier(&self, from: GeoPoint, to: GeoPoint, distance_km: f64, now: DateTime<Utc>) -> f64 {
        let key = Self::segment_key(from, to);
        {
            let state = self.state.read().expect("traffic lock poisoned");
            if now - state.refreshed_at < self.refresh_interval {
                if let Some(&m) = state.multipliers.get(&key) {
                    return m;
                }
            }
        }

        let mut state = self.state.write().expect("traffic lock poisoned");
        if now - state.refreshed_at >= self.refresh_interval {
            state.multipliers.clear();
            state.refreshed_at = now;
        }
        let epoch = state.refreshed_at.timestamp();
        let multiplier = *state
            .multipliers
            .entry(key.clone())
            .or_insert_with(|| Self::synthesize(&key, distance_km, epoch));
        multiplier
    }
}
