//! The persisted lifecycle state of one driver's route for one shift.
//!
//! `PersistentRoute` owns its stops and an append-only history log. All
//! mutation goes through methods here so the sequence and status invariants
//! hold no matter which service calls in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{ApplicationError, ApplicationResult};
use crate::domains::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl StopStatus {
    /// Terminal statuses never transition back to pending.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StopStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: Uuid,
    /// 1-based, unique, strictly increasing within the route.
    pub sequence: u32,
    pub order_id: String,
    pub point: GeoPoint,
    pub status: StopStatus,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub estimated_distance_km: f64,
    pub estimated_time_min: f64,
    pub actual_distance_km: Option<f64>,
    pub actual_time_min: Option<f64>,
    /// When the stop reached a terminal status, completed or otherwise.
    pub closed_at: Option<DateTime<Utc>>,
    pub optimization_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStatus {
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteStatus::Active => write!(f, "active"),
            RouteStatus::Completed => write!(f, "completed"),
            RouteStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteAction {
    Created,
    Updated,
    Completed,
    Cancelled,
    Recalculated,
}

/// One entry per mutating operation, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteHistoryEntry {
    pub id: Uuid,
    pub route_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: RouteAction,
    pub description: String,
    pub stop_count: usize,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub algorithm: String,
    pub candidates_evaluated: usize,
    pub computation_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentRoute {
    pub id: Uuid,
    pub driver_id: String,
    pub shift_date: NaiveDate,
    pub status: RouteStatus,
    pub stops: Vec<RouteStop>,
    pub history: Vec<RouteHistoryEntry>,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    pub completed_distance_km: f64,
    pub completed_time_min: f64,
    pub center: GeoPoint,
    pub metrics: OptimizationMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistentRoute {
    pub fn new(
        driver_id: String,
        shift_date: NaiveDate,
        stops: Vec<RouteStop>,
        center: GeoPoint,
        metrics: OptimizationMetrics,
        now: DateTime<Utc>,
    ) -> Self {
        let mut route = Self {
            id: Uuid::new_v4(),
            driver_id,
            shift_date,
            status: RouteStatus::Active,
            stops,
            history: Vec::new(),
            total_distance_km: 0.0,
            total_time_min: 0.0,
            completed_distance_km: 0.0,
            completed_time_min: 0.0,
            center,
            metrics,
            created_at: now,
            updated_at: now,
        };
        route.recompute_totals();
        route
    }

    pub fn is_active(&self) -> bool {
        self.status == RouteStatus::Active
    }

    pub fn pending_stops(&self) -> Vec<&RouteStop> {
        self.stops.iter().filter(|s| s.status == StopStatus::Pending).collect()
    }

    /// Appends a history entry carrying the route's resulting totals.
    pub fn record(
        &mut self,
        action: RouteAction,
        description: String,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.history.push(RouteHistoryEntry {
            id: Uuid::new_v4(),
            route_id: self.id,
            timestamp: now,
            action,
            description,
            stop_count: self.stops.len(),
            total_distance_km: self.total_distance_km,
            total_time_min: self.total_time_min,
            metadata,
        });
        self.updated_at = now;
    }

    fn ensure_active(&self) -> ApplicationResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ApplicationError::RouteClosed {
                id: self.id.to_string(),
                status: self.status.to_string(),
            })
        }
    }

    fn stop_mut(&mut self, stop_id: Uuid) -> ApplicationResult<&mut RouteStop> {
        self.stops
            .iter_mut()
            .find(|s| s.id == stop_id)
            .ok_or(ApplicationError::StopNotFound { id: stop_id.to_string() })
    }

    /// Marks a stop completed. Terminal stops stay terminal; completed
    /// distance/time are recomputed in full from the completed-stop set so
    /// out-of-order or repeated updates cannot drift the totals.
    pub fn complete_stop(
        &mut self,
        stop_id: Uuid,
        actual_time_min: Option<f64>,
        actual_distance_km: Option<f64>,
        now: DateTime<Utc>,
    ) -> ApplicationResult<()> {
        self.ensure_active()?;
        let stop = self.stop_mut(stop_id)?;
        if stop.status.is_terminal() {
            return Err(ApplicationError::Domain(
                crate::common::DomainError::Validation {
                    reason: format!("stop {} is already {:?}", stop_id, stop.status),
                },
            ));
        }
        stop.status = StopStatus::Completed;
        stop.closed_at = Some(now);
        stop.actual_time_min = actual_time_min;
        stop.actual_distance_km = actual_distance_km;
        self.recompute_completed_totals();
        Ok(())
    }

    /// Marks a stop cancelled (terminal). Remaining stops are left untouched.
    pub fn cancel_stop(&mut self, stop_id: Uuid, now: DateTime<Utc>) -> ApplicationResult<()> {
        self.ensure_active()?;
        let stop = self.stop_mut(stop_id)?;
        if stop.status.is_terminal() {
            return Err(ApplicationError::Domain(
                crate::common::DomainError::Validation {
                    reason: format!("stop {} is already {:?}", stop_id, stop.status),
                },
            ));
        }
        stop.status = StopStatus::Cancelled;
        stop.closed_at = Some(now);
        Ok(())
    }

    /// Replaces the pending stops with a newly optimized set, leaving
    /// terminal stops and their sequence numbers untouched. The replacements
    /// take the sequence numbers not held by terminal stops, in optimized
    /// order, so the route stays gapless.
    pub fn replace_pending_stops(&mut self, mut replacements: Vec<RouteStop>) {
        let terminal: Vec<RouteStop> = self
            .stops
            .iter()
            .filter(|s| s.status.is_terminal())
            .cloned()
            .collect();
        let taken: Vec<u32> = terminal.iter().map(|s| s.sequence).collect();
        let total = terminal.len() + replacements.len();

        let mut free: Vec<u32> = (1..=total as u32).filter(|n| !taken.contains(n)).collect();
        free.sort_unstable();
        for (stop, seq) in replacements.iter_mut().zip(free) {
            stop.sequence = seq;
        }

        let mut stops = terminal;
        stops.extend(replacements);
        stops.sort_by_key(|s| s.sequence);
        self.stops = stops;
        self.recompute_totals();
    }

    /// Renumbers every stop 1..n in the given order. Used only by the
    /// explicit recalculation operation, which is allowed to move terminal
    /// stops.
    pub fn resequence_all(&mut self, stops: Vec<RouteStop>) {
        self.stops = stops;
        for (i, stop) in self.stops.iter_mut().enumerate() {
            stop.sequence = (i + 1) as u32;
        }
        self.recompute_totals();
    }

    pub fn close(&mut self, status: RouteStatus) -> ApplicationResult<()> {
        self.ensure_active()?;
        self.status = status;
        Ok(())
    }

    /// Full recompute of route totals from the per-stop estimates.
    pub fn recompute_totals(&mut self) {
        self.total_distance_km = self.stops.iter().map(|s| s.estimated_distance_km).sum();
        self.total_time_min = self.stops.iter().map(|s| s.estimated_time_min).sum();
        self.recompute_completed_totals();
    }

    /// Full recompute over the completed-stop set; actuals win over
    /// estimates where the driver reported them.
    fn recompute_completed_totals(&mut self) {
        let completed = self.stops.iter().filter(|s| s.status == StopStatus::Completed);
        let mut distance = 0.0;
        let mut time = 0.0;
        for stop in completed {
            distance += stop.actual_distance_km.unwrap_or(stop.estimated_distance_km);
            time += stop.actual_time_min.unwrap_or(stop.estimated_time_min);
        }
        self.completed_distance_km = distance;
        self.completed_time_min = time;
    }

    /// Sequence invariant: 1-based, gapless, strictly increasing.
    pub fn sequence_is_gapless(&self) -> bool {
        let mut seqs: Vec<u32> = self.stops.iter().map(|s| s.sequence).collect();
        seqs.sort_unstable();
        seqs.iter().enumerate().all(|(i, &s)| s == (i + 1) as u32)
    }
}
