//! Multi-heuristic route optimization.
//!
//! The engine validates its input, filters an infeasible subset out, runs
//! several independent heuristics under one deadline, and returns the best
//! valid candidate by total distance. It never panics and never returns
//! `Err`: failures are reported through `is_valid` and `errors` on the
//! result, with a sequential fallback ordering so callers always get a
//! usable route for valid non-empty input.

pub mod algorithms;
pub mod traffic;

pub use traffic::{FreeFlowTraffic, SimulatedTraffic, TrafficModel};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::OptimizerConfig;
use crate::domains::geo::{DistanceEstimator, GeoPoint, RoadType};
use crate::domains::routing::optimizer::algorithms::PlanningContext;
use crate::domains::routing::types::{DeliveryStop, VehicleConstraints};

/// Per-stop estimate in visit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStop {
    /// Index into the stop slice passed to `optimize`.
    pub stop_index: usize,
    pub estimated_arrival: DateTime<Utc>,
    pub traffic_multiplier: f64,
    pub leg_distance_km: f64,
    pub leg_time_min: f64,
    /// Per-stop cost score; lower-cost legs score higher.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedRoute {
    /// Visiting order as indices into the input stop slice.
    pub sequence: Vec<usize>,
    pub planned_stops: Vec<PlannedStop>,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    pub algorithm: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub candidates_evaluated: usize,
    pub computation_ms: u64,
}

impl OptimizedRoute {
    fn empty(algorithm: &str) -> Self {
        Self {
            sequence: Vec::new(),
            planned_stops: Vec::new(),
            total_distance_km: 0.0,
            total_time_min: 0.0,
            algorithm: algorithm.to_string(),
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            candidates_evaluated: 0,
            computation_ms: 0,
        }
    }

    fn invalid(reason: String) -> Self {
        let mut route = Self::empty("none");
        route.is_valid = false;
        route.errors.push(reason);
        route
    }
}

pub struct RouteOptimizerEngine {
    estimator: Arc<DistanceEstimator>,
    traffic: Arc<dyn TrafficModel>,
    config: OptimizerConfig,
}

impl RouteOptimizerEngine {
    pub fn new(
        estimator: Arc<DistanceEstimator>,
        traffic: Arc<dyn TrafficModel>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            estimator,
            traffic,
            config,
        }
    }

    /// Computes a near-optimal visiting order for the stops. Non-throwing:
    /// malformed input yields an explicit invalid result.
    pub fn optimize(
        &self,
        start: GeoPoint,
        stops: &[DeliveryStop],
        constraints: &VehicleConstraints,
        now: DateTime<Utc>,
    ) -> OptimizedRoute {
        let started = Instant::now();

        if !start.is_valid() {
            return OptimizedRoute::invalid(format!(
                "malformed start coordinates [{}, {}]",
                start.lat, start.lon
            ));
        }
        if let Err(reason) = constraints.validate() {
            return OptimizedRoute::invalid(format!("inconsistent constraints: {}", reason));
        }
        if stops.len() > self.config.max_stops {
            return OptimizedRoute::invalid(format!(
                "{} stops exceeds the {}-stop cap",
                stops.len(),
                self.config.max_stops
            ));
        }
        if stops.is_empty() {
            return OptimizedRoute::empty("none");
        }

        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let valid: Vec<usize> = stops
            .iter()
            .enumerate()
            .filter_map(|(i, stop)| {
                if stop.point.is_valid() {
                    Some(i)
                } else {
                    warnings.push(format!(
                        "stop {} dropped: malformed coordinates [{}, {}]",
                        stop.id, stop.point.lat, stop.point.lon
                    ));
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            let mut route = OptimizedRoute::invalid("no valid stops after validation".to_string());
            route.warnings = warnings;
            return route;
        }

        let mut feasible = self.feasible_subset(&valid, stops, constraints, now);
        if feasible.is_empty() {
            warnings.push(
                "feasibility filter excluded every stop; optimizing over all valid stops instead"
                    .to_string(),
            );
            feasible = valid;
        }

        let deadline = started + std::time::Duration::from_secs(self.config.timeout_secs);
        let ctx = PlanningContext {
            start,
            stops,
            feasible: &feasible,
            estimator: &self.estimator,
            constraints,
            now,
            deadline,
        };

        let mut candidates: Vec<(&str, crate::common::DomainResult<Vec<usize>>)> = vec![
            ("nearest_from_start", algorithms::nearest_from_start(&ctx)),
            ("time_window_priority", algorithms::time_window_priority(&ctx)),
        ];
        if feasible.len() <= self.config.cluster_limit {
            candidates.push(("hybrid_scored", algorithms::hybrid_scored(&ctx)));
        }
        let candidates_evaluated = candidates.len();

        let mut best: Option<(&str, Vec<usize>, Vec<PlannedStop>, f64, f64)> = None;
        let mut failures = Vec::new();
        for (name, outcome) in candidates {
            match outcome {
                Ok(order) if order.is_empty() => {
                    failures.push(format!("{}: returned an empty route", name));
                }
                Ok(order) => {
                    let (planned, distance, time) = self.plan_legs(start, &order, stops, now);
                    debug!(algorithm = name, distance_km = distance, "candidate evaluated");
                    if best.as_ref().map_or(true, |(_, _, _, d, _)| distance < *d) {
                        best = Some((name, order, planned, distance, time));
                    }
                }
                Err(e) => {
                    warn!(algorithm = name, error = %e, "candidate algorithm failed");
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        let (algorithm, sequence, planned_stops, total_distance, total_time, is_valid) = match best
        {
            Some((name, order, planned, distance, time)) => {
                // A failed sibling candidate is only advisory once any
                // candidate produced a route.
                warnings.extend(failures.drain(..));
                (name.to_string(), order, planned, distance, time, true)
            }
            None => {
                errors.extend(failures.drain(..));
                // Degraded fallback: original input order. Always succeeds
                // for valid non-empty input.
                let order = algorithms::sequential(&feasible);
                let (planned, distance, time) = self.plan_legs(start, &order, stops, now);
                ("sequential_fallback".to_string(), order, planned, distance, time, false)
            }
        };

        let mut route = OptimizedRoute {
            sequence,
            planned_stops,
            total_distance_km: total_distance,
            total_time_min: total_time,
            algorithm,
            is_valid,
            errors,
            warnings,
            candidates_evaluated,
            computation_ms: started.elapsed().as_millis() as u64,
        };
        self.check_result(&mut route, &feasible);
        route
    }

    /// Stops passing capacity (120% of max) and 2-hour-buffered working-hours
    /// pre-filtering.
    fn feasible_subset(
        &self,
        valid: &[usize],
        stops: &[DeliveryStop],
        constraints: &VehicleConstraints,
        _now: DateTime<Utc>,
    ) -> Vec<usize> {
        let overload_limit = constraints.max_capacity * self.config.capacity_overload_factor;
        let buffer = Duration::hours(self.config.working_hours_buffer_hours);

        valid
            .iter()
            .copied()
            .filter(|&i| {
                let stop = &stops[i];
                let weight = stop.package_weight.unwrap_or(0.0);
                if constraints.current_load + weight > overload_limit {
                    return false;
                }
                if let (Some(hours), Some(window)) = (constraints.working_hours, stop.time_window) {
                    let earliest = hours.start - buffer;
                    let latest = hours.end + buffer;
                    if window.end < earliest || window.start > latest {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// Walks an ordering, accumulating distance and a simulated clock, with
    /// traffic multipliers applied per leg.
    fn plan_legs(
        &self,
        start: GeoPoint,
        order: &[usize],
        stops: &[DeliveryStop],
        now: DateTime<Utc>,
    ) -> (Vec<PlannedStop>, f64, f64) {
        let mut planned = Vec::with_capacity(order.len());
        let mut location = start;
        let mut clock = now;
        let mut total_distance = 0.0;
        let mut total_time = 0.0;

        for &idx in order {
            let stop = &stops[idx];
            let distance = self.estimator.pair_distance(location, stop.point, now);
            let multiplier = self.traffic.multiplier(location, stop.point, distance, now);
            let travel_min = self.estimator.travel_time(distance, RoadType::City) * multiplier;
            let arrival = clock + Duration::seconds((travel_min * 60.0) as i64);

            planned.push(PlannedStop {
                stop_index: idx,
                estimated_arrival: arrival,
                traffic_multiplier: multiplier,
                leg_distance_km: distance,
                leg_time_min: travel_min,
                score: -distance,
            });

            total_distance += distance;
            total_time += travel_min + stop.service_time_min;
            clock = arrival + Duration::seconds((stop.service_time_min * 60.0) as i64);
            location = stop.point;
        }

        (planned, total_distance, total_time)
    }

    /// Post-hoc validation, always applied: the route must be a permutation
    /// of the feasible indices with finite non-negative totals. Violations
    /// are flagged and clamped, never thrown.
    fn check_result(&self, route: &mut OptimizedRoute, feasible: &[usize]) {
        if route.sequence.len() != feasible.len() {
            route.errors.push(format!(
                "route covers {} of {} feasible stops",
                route.sequence.len(),
                feasible.len()
            ));
            route.is_valid = false;
        }
        let mut seen = std::collections::HashSet::new();
        for &idx in &route.sequence {
            if !feasible.contains(&idx) {
                route.errors.push(format!("index {} is not a feasible stop", idx));
                route.is_valid = false;
            }
            if !seen.insert(idx) {
                route.errors.push(format!("index {} appears more than once", idx));
                route.is_valid = false;
            }
        }
        if !route.total_distance_km.is_finite() || route.total_distance_km < 0.0 {
            route.errors.push(format!("non-finite total distance {}", route.total_distance_km));
            route.total_distance_km = 0.0;
            route.is_valid = false;
        }
        if !route.total_time_min.is_finite() || route.total_time_min < 0.0 {
            route.errors.push(format!("non-finite total time {}", route.total_time_min));
            route.total_time_min = 0.0;
            route.is_valid = false;
        }
    }
}
