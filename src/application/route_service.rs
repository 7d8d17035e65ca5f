//! Owns the persisted lifecycle of a driver's active route.
//!
//! All mutations for one route are serialized behind a per-route async lock,
//! so concurrent completions/additions/cancellations never interleave partial
//! writes. When the durable store's schema is unavailable the manager
//! downgrades to in-memory shadow routes instead of failing; a write that
//! genuinely fails while the schema is present is a hard error.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::{ApplicationError, ApplicationResult, DomainError};
use crate::config::Config;
use crate::domains::geo::{GeoPoint, GeoResolver};
use crate::domains::routing::optimizer::{OptimizedRoute, RouteOptimizerEngine};
use crate::domains::routing::ports::{DriverLocationFeed, OrderSource, RouteStore};
use crate::domains::routing::route::{
    OptimizationMetrics, PersistentRoute, RouteAction, RouteStatus, RouteStop, StopStatus,
};
use crate::domains::routing::types::{DeliveryStop, Order, VehicleConstraints};

pub struct RouteStateManager {
    store: Arc<dyn RouteStore>,
    orders: Arc<dyn OrderSource>,
    locations: Arc<dyn DriverLocationFeed>,
    resolver: Arc<GeoResolver>,
    engine: Arc<RouteOptimizerEngine>,
    config: Config,
    /// Per-route mutual exclusion for mutating operations.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Routes held in memory while the store schema is unavailable.
    shadow: RwLock<HashMap<Uuid, PersistentRoute>>,
}

impl RouteStateManager {
    pub fn new(
        store: Arc<dyn RouteStore>,
        orders: Arc<dyn OrderSource>,
        locations: Arc<dyn DriverLocationFeed>,
        resolver: Arc<GeoResolver>,
        engine: Arc<RouteOptimizerEngine>,
        config: Config,
    ) -> Self {
        Self {
            store,
            orders,
            locations,
            resolver,
            engine,
            config,
            locks: Mutex::new(HashMap::new()),
            shadow: RwLock::new(HashMap::new()),
        }
    }

    /// Optimizes the deliverable orders into a new active route for the
    /// driver's shift and persists it (or shadows it in degraded mode).
    pub async fn create_route(
        &self,
        driver_id: &str,
        orders: &[Order],
        constraints: &VehicleConstraints,
    ) -> ApplicationResult<PersistentRoute> {
        let now = Utc::now();
        let stops = self.stops_from_orders(orders).await;
        let start = self.resolve_start(driver_id, &stops).await;

        let result = self.engine.optimize(start, &stops, constraints, now);
        let route_stops = Self::route_stops_from(&result, &stops, true);
        let center = Self::centroid(&route_stops).unwrap_or(start);

        let mut route = PersistentRoute::new(
            driver_id.to_string(),
            now.date_naive(),
            route_stops,
            center,
            OptimizationMetrics {
                algorithm: result.algorithm.clone(),
                candidates_evaluated: result.candidates_evaluated,
                computation_ms: result.computation_ms,
            },
            now,
        );
        route.record(
            RouteAction::Created,
            format!(
                "Route created with {} stops via {}",
                route.stops.len(),
                result.algorithm
            ),
            json!({ "warnings": result.warnings, "errors": result.errors }),
            now,
        );

        if self.store.schema_ready().await {
            self.store
                .insert_route(&route)
                .await
                .map_err(|e| DomainError::PersistenceUnavailable { reason: e.to_string() })?;
            info!(route_id = %route.id, driver_id, "route created");
        } else {
            warn!(route_id = %route.id, driver_id, "route store schema unavailable, keeping route in memory");
            self.shadow.write().await.insert(route.id, route.clone());
        }
        Ok(route)
    }

    /// Today's active route for the driver, with stops joined to live order
    /// state. A route whose stops fail to join any valid order is treated as
    /// not found. Degraded store mode always reports no route.
    pub async fn get_current_route(
        &self,
        driver_id: &str,
    ) -> ApplicationResult<Option<PersistentRoute>> {
        if !self.store.schema_ready().await {
            warn!(driver_id, "route store schema unavailable, reporting no active route");
            return Ok(None);
        }
        let today = Utc::now().date_naive();
        let Some(route) = self.store.find_active_route(driver_id, today).await? else {
            return Ok(None);
        };

        let order_ids: Vec<String> = route.stops.iter().map(|s| s.order_id.clone()).collect();
        let orders = self.orders.find_orders(&order_ids).await?;
        let joined = route
            .stops
            .iter()
            .all(|s| orders.iter().any(|o| o.id == s.order_id));
        if !joined {
            warn!(route_id = %route.id, "route stops no longer join valid orders, treating as not found");
            return Ok(None);
        }
        Ok(Some(route))
    }

    /// Marks a stop completed and recomputes completed totals from the full
    /// completed-stop set.
    pub async fn complete_delivery(
        &self,
        route_id: Uuid,
        stop_id: Uuid,
        actual_time_min: Option<f64>,
        actual_distance_km: Option<f64>,
    ) -> ApplicationResult<PersistentRoute> {
        let lock = self.route_lock(route_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let (mut route, persisted) = self.load(route_id).await?;
        route.complete_stop(stop_id, actual_time_min, actual_distance_km, now)?;
        route.record(
            RouteAction::Completed,
            format!("Delivery completed for stop {}", stop_id),
            json!({
                "stop_id": stop_id,
                "actual_time_min": actual_time_min,
                "actual_distance_km": actual_distance_km,
            }),
            now,
        );
        self.save(&route, persisted).await?;
        Ok(route)
    }

    /// Merges a new order into the pending stops and re-optimizes exactly
    /// that subset; completed stops and their totals are untouched.
    pub async fn add_delivery(
        &self,
        route_id: Uuid,
        new_order: &Order,
        constraints: &VehicleConstraints,
    ) -> ApplicationResult<PersistentRoute> {
        let lock = self.route_lock(route_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let (mut route, persisted) = self.load(route_id).await?;
        if !route.is_active() {
            return Err(ApplicationError::RouteClosed {
                id: route.id.to_string(),
                status: route.status.to_string(),
            });
        }

        let (mut stops, orphaned) = self.pending_delivery_stops(&route).await?;
        // An unjoinable pending stop becomes terminal so it keeps occupying
        // its sequence slot; dropping it would leave a gap behind the
        // highest terminal sequence.
        for stop_id in &orphaned {
            route.cancel_stop(*stop_id, now)?;
        }
        let point = self.resolve_point(&new_order.delivery_address).await;
        stops.push(DeliveryStop::from_order(
            new_order,
            point,
            self.config.optimizer.default_service_time_min,
        ));

        let start = match self.locations.current_position(&route.driver_id).await {
            Some(position) => position,
            None => route.center,
        };
        let result = self.engine.optimize(start, &stops, constraints, now);
        let replacements = Self::route_stops_from(&result, &stops, false);
        route.replace_pending_stops(replacements);
        route.record(
            RouteAction::Updated,
            format!(
                "Re-optimized {} pending stops after adding order {}",
                route.pending_stops().len(),
                new_order.id
            ),
            json!({
                "order_id": new_order.id,
                "algorithm": result.algorithm,
                "cancelled_unjoinable": orphaned.len(),
            }),
            now,
        );
        self.save(&route, persisted).await?;
        Ok(route)
    }

    /// Marks a stop cancelled (terminal). Remaining stops are not
    /// re-optimized automatically.
    pub async fn cancel_delivery(
        &self,
        route_id: Uuid,
        stop_id: Uuid,
        reason: &str,
    ) -> ApplicationResult<PersistentRoute> {
        let lock = self.route_lock(route_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let (mut route, persisted) = self.load(route_id).await?;
        route.cancel_stop(stop_id, now)?;
        route.record(
            RouteAction::Cancelled,
            format!("Delivery cancelled for stop {}: {}", stop_id, reason),
            json!({ "stop_id": stop_id, "reason": reason }),
            now,
        );
        self.save(&route, persisted).await?;
        Ok(route)
    }

    /// Re-optimizes the pending subset from the configured default depot and
    /// renumbers the whole route in place.
    pub async fn recalculate_route(
        &self,
        route_id: Uuid,
        pending_orders: &[Order],
        constraints: &VehicleConstraints,
    ) -> ApplicationResult<PersistentRoute> {
        let lock = self.route_lock(route_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let (mut route, persisted) = self.load(route_id).await?;
        if !route.is_active() {
            return Err(ApplicationError::RouteClosed {
                id: route.id.to_string(),
                status: route.status.to_string(),
            });
        }

        let stops = self.stops_from_orders(pending_orders).await;
        let [lat, lon] = self.config.geocoding.default_center;
        let depot = GeoPoint::new(lat, lon);
        let result = self.engine.optimize(depot, &stops, constraints, now);

        let mut resequenced: Vec<RouteStop> = route
            .stops
            .iter()
            .filter(|s| s.status.is_terminal())
            .cloned()
            .collect();
        resequenced.extend(Self::route_stops_from(&result, &stops, false));
        route.resequence_all(resequenced);
        route.record(
            RouteAction::Recalculated,
            format!(
                "Route recalculated over {} pending orders via {}",
                pending_orders.len(),
                result.algorithm
            ),
            json!({ "algorithm": result.algorithm }),
            now,
        );
        self.save(&route, persisted).await?;
        Ok(route)
    }

    /// Sets the route to completed. Terminal: the route cannot be reopened.
    pub async fn end_shift(&self, route_id: Uuid) -> ApplicationResult<PersistentRoute> {
        let lock = self.route_lock(route_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let (mut route, persisted) = self.load(route_id).await?;
        route.close(RouteStatus::Completed)?;
        route.record(
            RouteAction::Completed,
            "Shift ended".to_string(),
            json!({
                "completed_distance_km": route.completed_distance_km,
                "completed_time_min": route.completed_time_min,
            }),
            now,
        );
        self.save(&route, persisted).await?;
        info!(route_id = %route.id, "shift ended");
        Ok(route)
    }

    async fn route_lock(&self, route_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(route_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, route_id: Uuid) -> ApplicationResult<(PersistentRoute, bool)> {
        if self.store.schema_ready().await {
            if let Some(route) = self.store.load_route(route_id).await? {
                return Ok((route, true));
            }
        } else if let Some(route) = self.shadow.read().await.get(&route_id) {
            return Ok((route.clone(), false));
        }
        Err(ApplicationError::RouteNotFound { id: route_id.to_string() })
    }

    async fn save(&self, route: &PersistentRoute, persisted: bool) -> ApplicationResult<()> {
        if persisted {
            self.store
                .update_route(route)
                .await
                .map_err(|e| DomainError::PersistenceUnavailable { reason: e.to_string() })?;
        } else {
            warn!(route_id = %route.id, "applying route mutation in memory only");
            self.shadow.write().await.insert(route.id, route.clone());
        }
        Ok(())
    }

    async fn resolve_point(&self, address: &str) -> GeoPoint {
        match self.resolver.resolve(address).await {
            Some(result) => result.point,
            None => self.resolver.fallback_point(address),
        }
    }

    async fn stops_from_orders(&self, orders: &[Order]) -> Vec<DeliveryStop> {
        let mut stops = Vec::new();
        for order in orders.iter().filter(|o| o.is_deliverable()) {
            let point = self.resolve_point(&order.delivery_address).await;
            stops.push(DeliveryStop::from_order(
                order,
                point,
                self.config.optimizer.default_service_time_min,
            ));
        }
        stops
    }

    /// Rebuilds delivery stops for the route's pending subset from live order
    /// state, reusing the coordinates already resolved for the route. Pending
    /// stops that no longer join an order are returned separately so the
    /// caller can cancel them rather than lose their sequence slots.
    async fn pending_delivery_stops(
        &self,
        route: &PersistentRoute,
    ) -> ApplicationResult<(Vec<DeliveryStop>, Vec<Uuid>)> {
        let pending: Vec<&RouteStop> = route.pending_stops();
        let ids: Vec<String> = pending.iter().map(|s| s.order_id.clone()).collect();
        let orders = self.orders.find_orders(&ids).await?;

        let mut stops = Vec::with_capacity(pending.len());
        let mut orphaned = Vec::new();
        for route_stop in pending {
            let Some(order) = orders.iter().find(|o| o.id == route_stop.order_id) else {
                warn!(order_id = %route_stop.order_id, "pending stop no longer joins an order, cancelling it");
                orphaned.push(route_stop.id);
                continue;
            };
            let mut stop = DeliveryStop::from_order(
                order,
                route_stop.point,
                self.config.optimizer.default_service_time_min,
            );
            stop.id = format!("stop-{}", order.id);
            stops.push(stop);
        }
        Ok((stops, orphaned))
    }

    /// Live driver position, else centroid of the geocoded delivery
    /// addresses, else the configured default center.
    async fn resolve_start(&self, driver_id: &str, stops: &[DeliveryStop]) -> GeoPoint {
        if let Some(position) = self.locations.current_position(driver_id).await {
            return position;
        }
        let points: Vec<GeoPoint> = stops.iter().map(|s| s.point).collect();
        if let Some(centroid) = Self::centroid_of(&points) {
            return centroid;
        }
        let [lat, lon] = self.config.geocoding.default_center;
        GeoPoint::new(lat, lon)
    }

    fn centroid(stops: &[RouteStop]) -> Option<GeoPoint> {
        let points: Vec<GeoPoint> = stops.iter().map(|s| s.point).collect();
        Self::centroid_of(&points)
    }

    fn centroid_of(points: &[GeoPoint]) -> Option<GeoPoint> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        Some(GeoPoint::new(
            points.iter().map(|p| p.lat).sum::<f64>() / n,
            points.iter().map(|p| p.lon).sum::<f64>() / n,
        ))
    }

    /// Maps an optimization result onto route stops. Sequence numbers are
    /// only final when building a whole route; replacements get theirs from
    /// the aggregate.
    fn route_stops_from(
        result: &OptimizedRoute,
        stops: &[DeliveryStop],
        number_from_one: bool,
    ) -> Vec<RouteStop> {
        result
            .planned_stops
            .iter()
            .enumerate()
            .map(|(i, planned)| {
                let stop = &stops[planned.stop_index];
                RouteStop {
                    id: Uuid::new_v4(),
                    sequence: if number_from_one { (i + 1) as u32 } else { 0 },
                    order_id: stop.order_id.clone(),
                    point: stop.point,
                    status: StopStatus::Pending,
                    estimated_arrival: Some(planned.estimated_arrival),
                    estimated_distance_km: planned.leg_distance_km,
                    estimated_time_min: planned.leg_time_min + stop.service_time_min,
                    actual_distance_km: None,
                    actual_time_min: None,
                    closed_at: None,
                    optimization_score: planned.score,
                }
            })
            .collect()
    }
}
