use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::common::DomainResult;
use crate::domains::geo::GeoPoint;
use crate::domains::routing::route::PersistentRoute;
use crate::domains::routing::types::Order;

/// Port for the durable route store. The storage technology is not part of
/// this core; `schema_ready` is the degraded-mode probe: when it reports
/// false, the state manager falls back to in-memory objects instead of
/// erroring.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn schema_ready(&self) -> bool;
    async fn insert_route(&self, route: &PersistentRoute) -> DomainResult<()>;
    async fn update_route(&self, route: &PersistentRoute) -> DomainResult<()>;
    async fn load_route(&self, route_id: Uuid) -> DomainResult<Option<PersistentRoute>>;
    async fn find_active_route(
        &self,
        driver_id: &str,
        shift_date: NaiveDate,
    ) -> DomainResult<Option<PersistentRoute>>;
}

/// Port to the external order system. Read-only.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn find_orders(&self, ids: &[String]) -> DomainResult<Vec<Order>>;
}

/// Port for periodic driver position fixes. Absence is normal; callers fall
/// back to the geocoded centroid or the configured default.
#[async_trait]
pub trait DriverLocationFeed: Send + Sync {
    async fn current_position(&self, driver_id: &str) -> Option<GeoPoint>;
}
