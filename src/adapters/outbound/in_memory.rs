//! In-memory adapters for testing, development, and degraded-store drills.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::{DomainError, DomainResult};
use crate::domains::geo::GeoPoint;
use crate::domains::routing::ports::{DriverLocationFeed, OrderSource, RouteStore};
use crate::domains::routing::route::{PersistentRoute, RouteStatus};
use crate::domains::routing::types::Order;

/// In-memory route store. `without_schema` simulates an unprovisioned
/// backend; `fail_writes` simulates a genuinely broken one.
#[derive(Debug, Default)]
pub struct InMemoryRouteStore {
    routes: RwLock<HashMap<Uuid, PersistentRoute>>,
    schema_ready: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            schema_ready: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn without_schema() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            schema_ready: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_allowed(&self) -> DomainResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(DomainError::Infrastructure("simulated write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }

    async fn insert_route(&self, route: &PersistentRoute) -> DomainResult<()> {
        self.write_allowed()?;
        self.routes.write().await.insert(route.id, route.clone());
        Ok(())
    }

    async fn update_route(&self, route: &PersistentRoute) -> DomainResult<()> {
        self.write_allowed()?;
        let mut routes = self.routes.write().await;
        if !routes.contains_key(&route.id) {
            return Err(DomainError::Infrastructure(format!(
                "route {} does not exist",
                route.id
            )));
        }
        routes.insert(route.id, route.clone());
        Ok(())
    }

    async fn load_route(&self, route_id: Uuid) -> DomainResult<Option<PersistentRoute>> {
        Ok(self.routes.read().await.get(&route_id).cloned())
    }

    async fn find_active_route(
        &self,
        driver_id: &str,
        shift_date: NaiveDate,
    ) -> DomainResult<Option<PersistentRoute>> {
        Ok(self
            .routes
            .read()
            .await
            .values()
            .find(|r| {
                r.driver_id == driver_id
                    && r.shift_date == shift_date
                    && r.status == RouteStatus::Active
            })
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_order(&self, order: Order) {
        self.orders.write().await.insert(order.id.clone(), order);
    }

    pub async fn remove_order(&self, id: &str) {
        self.orders.write().await.remove(id);
    }
}

#[async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn find_orders(&self, ids: &[String]) -> DomainResult<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(ids.iter().filter_map(|id| orders.get(id).cloned()).collect())
    }
}

/// Location feed fed manually, e.g. from tests or a demo harness.
#[derive(Debug, Default)]
pub struct StaticLocationFeed {
    positions: RwLock<HashMap<String, GeoPoint>>,
}

impl StaticLocationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_position(&self, driver_id: &str, position: GeoPoint) {
        self.positions.write().await.insert(driver_id.to_string(), position);
    }
}

#[async_trait]
impl DriverLocationFeed for StaticLocationFeed {
    async fn current_position(&self, driver_id: &str) -> Option<GeoPoint> {
        self.positions.read().await.get(driver_id).copied()
    }
}
