//! Event-driven re-optimization of an active route.
//!
//! Classifies driver/vehicle status updates into triggers, gates actual
//! re-optimization behind a per-driver cooldown, and always emits
//! human-readable alerts for every trigger it observed, whether or not a
//! re-optimization fired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::config::ReoptimizerConfig;
use crate::domains::geo::{DistanceEstimator, GeoPoint};
use crate::domains::routing::optimizer::{OptimizedRoute, RouteOptimizerEngine};
use crate::domains::routing::route::PersistentRoute;
use crate::domains::routing::types::{DeliveryStop, VehicleConstraints};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriggerPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    LocationUpdate,
    TimeWindowAlert,
    VehicleAlert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub priority: TriggerPriority,
    pub message: String,
}

/// One driver/vehicle status fix from the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStatusUpdate {
    pub driver_id: String,
    pub position: Option<GeoPoint>,
    pub fuel_level_pct: Option<f64>,
    pub current_load: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReoptimizationReport {
    pub triggers: Vec<Trigger>,
    pub alerts: Vec<String>,
    pub reoptimized: bool,
    pub distance_saved_km: f64,
    pub time_saved_min: f64,
    pub stops_affected: usize,
    pub route: Option<OptimizedRoute>,
}

impl ReoptimizationReport {
    fn skipped(triggers: Vec<Trigger>) -> Self {
        let alerts = triggers.iter().map(|t| t.message.clone()).collect();
        Self {
            triggers,
            alerts,
            reoptimized: false,
            distance_saved_km: 0.0,
            time_saved_min: 0.0,
            stops_affected: 0,
            route: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct DriverState {
    last_position: Option<GeoPoint>,
    last_reoptimized_at: Option<DateTime<Utc>>,
}

pub struct RealTimeReoptimizer {
    engine: Arc<RouteOptimizerEngine>,
    estimator: Arc<DistanceEstimator>,
    config: ReoptimizerConfig,
    /// Cooldown and last-known-position state, scoped per driver so one
    /// driver's optimization never stalls another's.
    drivers: RwLock<HashMap<String, DriverState>>,
}

impl RealTimeReoptimizer {
    pub fn new(
        engine: Arc<RouteOptimizerEngine>,
        estimator: Arc<DistanceEstimator>,
        config: ReoptimizerConfig,
    ) -> Self {
        Self {
            engine,
            estimator,
            config,
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Processes one status update against the driver's current route state.
    /// `pending` is the not-yet-completed subset of deliveries, supplied by
    /// the host from whatever the state manager currently holds.
    pub async fn process_update(
        &self,
        update: &DriverStatusUpdate,
        route: &PersistentRoute,
        pending: &[DeliveryStop],
        constraints: &VehicleConstraints,
        now: DateTime<Utc>,
    ) -> ReoptimizationReport {
        self.process_batch(std::slice::from_ref(update), route, pending, constraints, now)
            .await
    }

    /// Stream entry point: when updates arrive faster than they are
    /// processed, the most recent location/status wins for the decision but
    /// every distinct trigger observed in the interval still surfaces.
    pub async fn process_batch(
        &self,
        updates: &[DriverStatusUpdate],
        route: &PersistentRoute,
        pending: &[DeliveryStop],
        constraints: &VehicleConstraints,
        now: DateTime<Utc>,
    ) -> ReoptimizationReport {
        let Some(latest) = updates.last() else {
            return ReoptimizationReport::skipped(Vec::new());
        };
        let driver_id = latest.driver_id.clone();

        let mut triggers = Vec::new();
        {
            let mut drivers = self.drivers.write().await;
            let state = drivers.entry(driver_id.clone()).or_default();
            for update in updates {
                triggers.extend(self.classify_movement(update, state));
                triggers.extend(self.classify_vehicle(update));
            }
            triggers.extend(self.classify_time_windows(pending, now));
        }

        if !self.should_fire(&driver_id, &triggers, now).await {
            return ReoptimizationReport::skipped(triggers);
        }

        let start = match latest.position {
            Some(position) => position,
            None => route.center,
        };
        let mut effective = constraints.clone();
        effective.current_load = latest.current_load;

        let result = self.engine.optimize(start, pending, &effective, now);
        let (baseline_distance, baseline_time) = self.baseline(start, route, now);
        let stops_affected = Self::stops_affected(route, pending, &result);

        {
            let mut drivers = self.drivers.write().await;
            drivers.entry(driver_id.clone()).or_default().last_reoptimized_at = Some(now);
        }
        info!(
            driver_id,
            algorithm = %result.algorithm,
            distance_saved_km = baseline_distance - result.total_distance_km,
            "route re-optimized"
        );

        let alerts = triggers.iter().map(|t| t.message.clone()).collect();
        ReoptimizationReport {
            triggers,
            alerts,
            reoptimized: true,
            distance_saved_km: baseline_distance - result.total_distance_km,
            time_saved_min: baseline_time - result.total_time_min,
            stops_affected,
            route: Some(result),
        }
    }

    /// Fires only beyond the per-driver cooldown, and then only for a
    /// critical/high trigger or at least two co-occurring medium triggers.
    async fn should_fire(&self, driver_id: &str, triggers: &[Trigger], now: DateTime<Utc>) -> bool {
        let drivers = self.drivers.read().await;
        if let Some(state) = drivers.get(driver_id) {
            if let Some(last) = state.last_reoptimized_at {
                if now - last < Duration::seconds(self.config.cooldown_secs) {
                    return false;
                }
            }
        }
        let severe = triggers
            .iter()
            .any(|t| t.priority >= TriggerPriority::High);
        let medium_count = triggers
            .iter()
            .filter(|t| t.priority == TriggerPriority::Medium)
            .count();
        severe || medium_count >= 2
    }

    fn classify_movement(&self, update: &DriverStatusUpdate, state: &mut DriverState) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        if let Some(position) = update.position {
            if let Some(previous) = state.last_position {
                let moved = self.estimator.distance(previous, position);
                if moved > self.config.movement_threshold_km {
                    triggers.push(Trigger {
                        kind: TriggerKind::LocationUpdate,
                        priority: TriggerPriority::Medium,
                        message: format!(
                            "Driver {} moved {:.1} km from last known position",
                            update.driver_id, moved
                        ),
                    });
                }
            }
            state.last_position = Some(position);
        }
        triggers
    }

    fn classify_vehicle(&self, update: &DriverStatusUpdate) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        if let Some(fuel) = update.fuel_level_pct {
            if fuel < self.config.low_fuel_threshold_pct {
                triggers.push(Trigger {
                    kind: TriggerKind::VehicleAlert,
                    priority: TriggerPriority::Medium,
                    message: format!(
                        "Vehicle for driver {} is low on fuel ({:.0}%)",
                        update.driver_id, fuel
                    ),
                });
            }
        }
        triggers
    }

    fn classify_time_windows(&self, pending: &[DeliveryStop], now: DateTime<Utc>) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        for stop in pending {
            let Some(window) = &stop.time_window else { continue };
            let remaining = window.end - now;
            if remaining < Duration::minutes(self.config.window_critical_min) {
                triggers.push(Trigger {
                    kind: TriggerKind::TimeWindowAlert,
                    priority: TriggerPriority::Critical,
                    message: format!(
                        "Delivery window for order {} closes in {} min",
                        stop.order_id,
                        remaining.num_minutes().max(0)
                    ),
                });
            } else if remaining < Duration::minutes(self.config.window_high_min) {
                triggers.push(Trigger {
                    kind: TriggerKind::TimeWindowAlert,
                    priority: TriggerPriority::High,
                    message: format!(
                        "Delivery window for order {} closes in {} min",
                        stop.order_id,
                        remaining.num_minutes()
                    ),
                });
            }
        }
        triggers
    }

    /// Remaining distance/time of the prior route over its pending stops,
    /// measured from the driver's current position.
    fn baseline(&self, from: GeoPoint, route: &PersistentRoute, now: DateTime<Utc>) -> (f64, f64) {
        let mut location = from;
        let mut distance = 0.0;
        let mut time = 0.0;
        for stop in route.pending_stops() {
            distance += self.estimator.pair_distance(location, stop.point, now);
            time += stop.estimated_time_min;
            location = stop.point;
        }
        (distance, time)
    }

    /// Spawnable stream consumer over an update channel. See
    /// [`StatusStreamConsumer`].
    pub fn stream_consumer(
        self: &Arc<Self>,
        snapshot: Arc<RwLock<RouteSnapshot>>,
        updates: mpsc::Receiver<DriverStatusUpdate>,
        reports: mpsc::Sender<ReoptimizationReport>,
    ) -> StatusStreamConsumer {
        StatusStreamConsumer {
            reoptimizer: Arc::clone(self),
            snapshot,
            updates,
            reports,
        }
    }

    /// Number of pending stops whose position in the visiting order changed.
    fn stops_affected(
        route: &PersistentRoute,
        pending: &[DeliveryStop],
        result: &OptimizedRoute,
    ) -> usize {
        let prior: Vec<&str> = route
            .pending_stops()
            .iter()
            .map(|s| s.order_id.as_str())
            .collect();
        let new: Vec<&str> = result
            .sequence
            .iter()
            .map(|&i| pending[i].order_id.as_str())
            .collect();
        new.iter()
            .enumerate()
            .filter(|(i, order_id)| prior.get(*i).copied() != Some(**order_id))
            .count()
    }
}

/// The route state a stream decision runs against. The host refreshes it
/// whenever the state manager mutates the route.
#[derive(Clone)]
pub struct RouteSnapshot {
    pub route: PersistentRoute,
    pub pending: Vec<DeliveryStop>,
    pub constraints: VehicleConstraints,
}

/// Event-stream entry point for one driver's status updates.
///
/// Drains everything queued on the channel before deciding, so updates that
/// arrive faster than they are processed coalesce into one decision where
/// the most recent location/status wins while every observed trigger still
/// surfaces. One report is emitted per drained batch.
pub struct StatusStreamConsumer {
    reoptimizer: Arc<RealTimeReoptimizer>,
    snapshot: Arc<RwLock<RouteSnapshot>>,
    updates: mpsc::Receiver<DriverStatusUpdate>,
    reports: mpsc::Sender<ReoptimizationReport>,
}

impl StatusStreamConsumer {
    pub async fn run(&mut self) {
        while let Some(first) = self.updates.recv().await {
            let mut batch = vec![first];
            while let Ok(update) = self.updates.try_recv() {
                batch.push(update);
            }

            let snapshot = self.snapshot.read().await.clone();
            let report = self
                .reoptimizer
                .process_batch(
                    &batch,
                    &snapshot.route,
                    &snapshot.pending,
                    &snapshot.constraints,
                    Utc::now(),
                )
                .await;
            if self.reports.send(report).await.is_err() {
                info!("report receiver dropped, stopping status stream consumer");
                break;
            }
        }
    }
}
