//! Candidate ordering heuristics.
//!
//! Each heuristic independently produces a visiting order over the feasible
//! stop indices, or a `DomainError` when it cannot (deadline exceeded). The
//! engine evaluates and compares the results; nothing here touches route
//! state. The scoring formulas are intentionally independent per algorithm.

use chrono::{DateTime, Duration, Utc};
use std::time::Instant;

use crate::common::{DomainError, DomainResult};
use crate::domains::geo::{DistanceEstimator, GeoPoint, RoadType};
use crate::domains::routing::types::{DeliveryStop, VehicleConstraints};

pub(crate) struct PlanningContext<'a> {
    pub start: GeoPoint,
    pub stops: &'a [DeliveryStop],
    pub feasible: &'a [usize],
    pub estimator: &'a DistanceEstimator,
    pub constraints: &'a VehicleConstraints,
    pub now: DateTime<Utc>,
    pub deadline: Instant,
}

impl<'a> PlanningContext<'a> {
    fn check_deadline(&self) -> DomainResult<()> {
        let overrun = Instant::now().checked_duration_since(self.deadline);
        match overrun {
            Some(elapsed) => Err(DomainError::OptimizationTimeout {
                elapsed_ms: elapsed.as_millis() as u64,
            }),
            None => Ok(()),
        }
    }

    fn leg(&self, from: GeoPoint, to: GeoPoint) -> (f64, f64) {
        let distance = self.estimator.pair_distance(from, to, self.now);
        let time = self.estimator.travel_time(distance, RoadType::City);
        (distance, time)
    }
}

/// Greedy nearest neighbor: first stop is the globally closest to the start
/// point, then repeatedly the unvisited stop nearest the current location.
/// Distance and arrival accounting happens in the engine's leg planner.
pub(crate) fn nearest_from_start(ctx: &PlanningContext<'_>) -> DomainResult<Vec<usize>> {
    let mut remaining: Vec<usize> = ctx.feasible.to_vec();
    let mut order = Vec::with_capacity(remaining.len());
    let mut location = ctx.start;

    while !remaining.is_empty() {
        ctx.check_deadline()?;
        let (pick, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (pos, ctx.estimator.pair_distance(location, ctx.stops[idx].point, ctx.now)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("remaining is non-empty");

        let idx = remaining.swap_remove(pick);
        location = ctx.stops[idx].point;
        order.push(idx);
    }
    Ok(order)
}

/// Urgency score for the time-window heuristic: priority-tier weight plus a
/// deadline-proximity bonus tiered at <1h/<2h/<4h remaining.
fn urgency_score(stop: &DeliveryStop, now: DateTime<Utc>) -> f64 {
    let mut score = stop.priority.weight();
    if let Some(window) = &stop.time_window {
        let remaining = window.end - now;
        if remaining < Duration::hours(1) {
            score += 50.0;
        } else if remaining < Duration::hours(2) {
            score += 30.0;
        } else if remaining < Duration::hours(4) {
            score += 15.0;
        }
    }
    score
}

/// Visits stops strictly by descending urgency, ignoring geography.
pub(crate) fn time_window_priority(ctx: &PlanningContext<'_>) -> DomainResult<Vec<usize>> {
    ctx.check_deadline()?;
    let mut order: Vec<usize> = ctx.feasible.to_vec();
    order.sort_by(|&a, &b| {
        urgency_score(&ctx.stops[b], ctx.now)
            .partial_cmp(&urgency_score(&ctx.stops[a], ctx.now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(order)
}

/// Hybrid greedy: at each step every capacity-feasible unvisited stop is
/// scored as
///   -2*distance - 0.5*time + 10*priority_weight
///   +20 if the arrival would meet the stop's window, -50 if it would miss it
///   +10 if the stop leaves at least 10% capacity headroom
/// and the maximum wins. Only run for small clusters; the quadratic scan is
/// not worth it beyond the cluster limit.
pub(crate) fn hybrid_scored(ctx: &PlanningContext<'_>) -> DomainResult<Vec<usize>> {
    let mut remaining: Vec<usize> = ctx.feasible.to_vec();
    let mut order = Vec::with_capacity(remaining.len());
    let mut location = ctx.start;
    let mut clock = ctx.now;
    let mut load = ctx.constraints.current_load;
    let capacity = ctx.constraints.max_capacity;

    while !remaining.is_empty() {
        ctx.check_deadline()?;

        let mut best: Option<(usize, f64)> = None;
        for (pos, &idx) in remaining.iter().enumerate() {
            let stop = &ctx.stops[idx];
            let weight = stop.package_weight.unwrap_or(0.0);
            if load + weight > capacity {
                continue;
            }
            let (distance, time) = ctx.leg(location, stop.point);
            let arrival = clock + Duration::seconds((time * 60.0) as i64);
            let mut score = -(distance * 2.0) - (time * 0.5) + stop.priority.weight() * 10.0;
            if let Some(window) = &stop.time_window {
                score += if window.contains(arrival) { 20.0 } else { -50.0 };
            }
            if load + weight <= capacity * 0.9 {
                score += 10.0;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pos, score));
            }
        }

        // All remaining stops exceed capacity: fall back to nearest so the
        // route still covers the feasible set.
        let pos = match best {
            Some((pos, _)) => pos,
            None => {
                remaining
                    .iter()
                    .enumerate()
                    .map(|(pos, &idx)| {
                        (pos, ctx.estimator.pair_distance(location, ctx.stops[idx].point, ctx.now))
                    })
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .expect("remaining is non-empty")
                    .0
            }
        };

        let idx = remaining.swap_remove(pos);
        let stop = &ctx.stops[idx];
        let (_, travel_min) = ctx.leg(location, stop.point);
        clock = clock + Duration::seconds(((travel_min + stop.service_time_min) * 60.0) as i64);
        load += stop.package_weight.unwrap_or(0.0);
        location = stop.point;
        order.push(idx);
    }
    Ok(order)
}

/// Original input order. Must always succeed for valid non-empty input; the
/// engine uses it as the degraded fallback when every heuristic fails.
pub(crate) fn sequential(feasible: &[usize]) -> Vec<usize> {
    feasible.to_vec()
}
