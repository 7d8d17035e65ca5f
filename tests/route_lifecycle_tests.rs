use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use shiftroute::application::RouteStateManager;
use shiftroute::adapters::outbound::{InMemoryOrderSource, InMemoryRouteStore, StaticLocationFeed};
use shiftroute::common::{ApplicationError, DomainError, DomainResult};
use shiftroute::config::Config;
use shiftroute::domains::geo::{
    DistanceEstimator, GeoPoint, GeoResolver, GeocodeCandidate, GeocodeProvider, RateLimiter,
};
use shiftroute::domains::routing::optimizer::{FreeFlowTraffic, RouteOptimizerEngine};
use shiftroute::domains::routing::route::{RouteAction, RouteStatus, StopStatus};
use shiftroute::domains::routing::RouteStore;
use shiftroute::domains::routing::types::{Order, OrderStatus, Priority, TimeWindow, VehicleConstraints};

/// Provider that never finds anything, so every address lands on its
/// deterministic fallback coordinate without network delays.
struct NeverResolves;

#[async_trait]
impl GeocodeProvider for NeverResolves {
    async fn search(&self, _address: &str) -> DomainResult<Vec<GeocodeCandidate>> {
        Ok(Vec::new())
    }
}

struct Harness {
    store: Arc<InMemoryRouteStore>,
    orders: Arc<InMemoryOrderSource>,
    locations: Arc<StaticLocationFeed>,
    manager: RouteStateManager,
}

fn harness_with_store(store: InMemoryRouteStore) -> Harness {
    let config = Config::default();
    let store = Arc::new(store);
    let orders = Arc::new(InMemoryOrderSource::new());
    let locations = Arc::new(StaticLocationFeed::new());
    let limiter = Arc::new(RateLimiter::new(std::time::Duration::from_millis(0)));
    let resolver = Arc::new(GeoResolver::new(
        Arc::new(NeverResolves),
        limiter,
        config.geocoding.clone(),
    ));
    let estimator = Arc::new(DistanceEstimator::new(config.distance.clone()));
    let engine = Arc::new(RouteOptimizerEngine::new(
        estimator,
        Arc::new(FreeFlowTraffic),
        config.optimizer.clone(),
    ));
    let manager = RouteStateManager::new(
        store.clone(),
        orders.clone(),
        locations.clone(),
        resolver,
        engine,
        config,
    );
    Harness {
        store,
        orders,
        locations,
        manager,
    }
}

fn harness() -> Harness {
    harness_with_store(InMemoryRouteStore::new())
}

fn order(id: &str, address: &str) -> Order {
    Order {
        id: id.to_string(),
        delivery_address: address.to_string(),
        priority: Priority::Normal,
        time_window: None,
        package_weight: Some(3.0),
        special_requirements: Vec::new(),
        status: OrderStatus::Pending,
    }
}

fn constraints() -> VehicleConstraints {
    VehicleConstraints {
        max_capacity: 100.0,
        current_load: 10.0,
        max_stops: 50,
        working_hours: None,
    }
}

fn three_orders() -> Vec<Order> {
    vec![
        order("order-1", "100 Queen St W, Toronto"),
        order("order-2", "250 Front St W, Toronto"),
        order("order-3", "1 Austin Terrace, Toronto"),
    ]
}

async fn seed(h: &Harness, orders: &[Order]) {
    for o in orders {
        h.orders.put_order(o.clone()).await;
    }
}

#[tokio::test]
async fn test_create_route_optimizes_and_persists() {
    let h = harness();
    let orders = three_orders();

    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    assert_eq!(route.stops.len(), 3);
    assert!(route.sequence_is_gapless());
    assert_eq!(route.status, RouteStatus::Active);
    assert_eq!(route.history.len(), 1);
    assert_eq!(route.history[0].action, RouteAction::Created);
    assert!(route.total_distance_km > 0.0);
    assert!(h.store.load_route(route.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_non_deliverable_orders_are_skipped() {
    let h = harness();
    let mut orders = three_orders();
    orders[1].status = OrderStatus::Cancelled;

    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    assert_eq!(route.stops.len(), 2);
    assert!(route.stops.iter().all(|s| s.order_id != "order-2"));
}

#[tokio::test]
async fn test_get_current_route_requires_order_join() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let created = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    let found = h.manager.get_current_route("driver-1").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(created.id));

    // A stop that no longer joins a live order hides the whole route.
    h.orders.remove_order("order-2").await;
    assert!(h.manager.get_current_route("driver-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_completed_totals_never_decrease() {
    let h = harness();
    let route = h
        .manager
        .create_route("driver-1", &three_orders(), &constraints())
        .await
        .unwrap();

    let first = route.stops[0].id;
    let route = h
        .manager
        .complete_delivery(route.id, first, Some(12.0), Some(2.4))
        .await
        .unwrap();
    assert!((route.completed_distance_km - 2.4).abs() < 1e-9);
    assert!((route.completed_time_min - 12.0).abs() < 1e-9);

    let second = route
        .stops
        .iter()
        .find(|s| s.status == StopStatus::Pending)
        .unwrap()
        .id;
    let after = h.manager.complete_delivery(route.id, second, None, None).await.unwrap();
    assert!(after.completed_distance_km >= route.completed_distance_km);
    assert!(after.completed_time_min >= route.completed_time_min);

    // A completed stop never reverts, and re-completion is rejected.
    assert!(h.manager.complete_delivery(route.id, first, None, None).await.is_err());
}

#[tokio::test]
async fn test_every_mutation_appends_one_history_entry() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();
    assert_eq!(route.history.len(), 1);

    let route = h
        .manager
        .complete_delivery(route.id, route.stops[0].id, None, None)
        .await
        .unwrap();
    assert_eq!(route.history.len(), 2);
    assert_eq!(route.history[1].action, RouteAction::Completed);

    let pending = route.stops.iter().find(|s| s.status == StopStatus::Pending).unwrap().id;
    let route = h.manager.cancel_delivery(route.id, pending, "customer away").await.unwrap();
    assert_eq!(route.history.len(), 3);
    assert_eq!(route.history[2].action, RouteAction::Cancelled);

    let route = h.manager.end_shift(route.id).await.unwrap();
    assert_eq!(route.history.len(), 4);
    assert_eq!(route.history[3].action, RouteAction::Completed);
}

#[tokio::test]
async fn test_add_delivery_leaves_completed_stops_untouched() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    let done = route.stops[0].id;
    let done_sequence = route.stops[0].sequence;
    let done_order = route.stops[0].order_id.clone();
    let route = h.manager.complete_delivery(route.id, done, None, None).await.unwrap();

    let extra = order("order-4", "55 Mill St, Toronto");
    h.orders.put_order(extra.clone()).await;
    let route = h.manager.add_delivery(route.id, &extra, &constraints()).await.unwrap();

    assert_eq!(route.stops.len(), 4);
    assert!(route.sequence_is_gapless());
    assert_eq!(route.pending_stops().len(), 3);
    assert!(route.stops.iter().any(|s| s.order_id == "order-4"));
    let kept = route.stops.iter().find(|s| s.order_id == done_order).unwrap();
    assert_eq!(kept.status, StopStatus::Completed);
    assert_eq!(kept.sequence, done_sequence);
    assert_eq!(route.history.last().unwrap().action, RouteAction::Updated);
}

#[tokio::test]
async fn test_add_delivery_cancels_unjoinable_stops_keeping_sequences_gapless() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    // Complete the stop holding the highest sequence number, then make the
    // remaining pending stops unjoinable by withdrawing their orders.
    let last = route.stops.iter().max_by_key(|s| s.sequence).unwrap();
    let last_order = last.order_id.clone();
    let route = h.manager.complete_delivery(route.id, last.id, None, None).await.unwrap();
    for o in orders.iter().filter(|o| o.id != last_order) {
        h.orders.remove_order(&o.id).await;
    }

    let extra = order("order-4", "55 Mill St, Toronto");
    h.orders.put_order(extra.clone()).await;
    let route = h.manager.add_delivery(route.id, &extra, &constraints()).await.unwrap();

    assert!(route.sequence_is_gapless(), "sequences: {:?}",
        route.stops.iter().map(|s| s.sequence).collect::<Vec<_>>());
    assert_eq!(route.stops.len(), 4);
    // The withdrawn orders' stops went terminal instead of vanishing.
    let cancelled: Vec<_> = route
        .stops
        .iter()
        .filter(|s| s.status == StopStatus::Cancelled)
        .collect();
    assert_eq!(cancelled.len(), 2);
    assert_eq!(route.pending_stops().len(), 1);
    assert_eq!(route.pending_stops()[0].order_id, "order-4");
}

#[tokio::test]
async fn test_cancel_delivery_does_not_reorder_remaining_stops() {
    let h = harness();
    let route = h
        .manager
        .create_route("driver-1", &three_orders(), &constraints())
        .await
        .unwrap();
    let before: Vec<(String, u32)> = route.stops.iter().map(|s| (s.order_id.clone(), s.sequence)).collect();

    let victim = route.stops[1].id;
    let route = h.manager.cancel_delivery(route.id, victim, "refused").await.unwrap();

    let after: Vec<(String, u32)> = route.stops.iter().map(|s| (s.order_id.clone(), s.sequence)).collect();
    assert_eq!(before, after);
    assert_eq!(route.stops[1].status, StopStatus::Cancelled);
}

#[tokio::test]
async fn test_recalculate_renumbers_the_whole_route() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    let done_order = route.stops[0].order_id.clone();
    let route = h
        .manager
        .complete_delivery(route.id, route.stops[0].id, None, None)
        .await
        .unwrap();

    let remaining: Vec<Order> = orders.iter().filter(|o| o.id != done_order).cloned().collect();
    let route = h
        .manager
        .recalculate_route(route.id, &remaining, &constraints())
        .await
        .unwrap();

    assert_eq!(route.stops.len(), 3);
    let sequences: Vec<u32> = route.stops.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(route.stops[0].status, StopStatus::Completed);
    assert_eq!(route.history.last().unwrap().action, RouteAction::Recalculated);
}

#[tokio::test]
async fn test_ended_shift_rejects_further_mutation() {
    let h = harness();
    let orders = three_orders();
    seed(&h, &orders).await;
    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    let stop = route.stops[0].id;
    let route = h.manager.end_shift(route.id).await.unwrap();
    assert_eq!(route.status, RouteStatus::Completed);

    let denied = h.manager.complete_delivery(route.id, stop, None, None).await;
    assert!(matches!(denied, Err(ApplicationError::RouteClosed { .. })));
    assert!(h.manager.end_shift(route.id).await.is_err());
    // The route is no longer active, so there is nothing current.
    assert!(h.manager.get_current_route("driver-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_degraded_store_falls_back_to_memory() {
    let h = harness_with_store(InMemoryRouteStore::without_schema());
    let route = h
        .manager
        .create_route("driver-1", &three_orders(), &constraints())
        .await
        .unwrap();

    // Nothing reached the store, and reads report no active route.
    assert!(h.store.load_route(route.id).await.unwrap().is_none());
    assert!(h.manager.get_current_route("driver-1").await.unwrap().is_none());

    // Mutations still work against the shadow copy.
    let route = h
        .manager
        .complete_delivery(route.id, route.stops[0].id, None, None)
        .await
        .unwrap();
    assert_eq!(route.history.len(), 2);
}

#[tokio::test]
async fn test_write_failure_with_schema_is_a_hard_error() {
    let h = harness();
    h.store.set_fail_writes(true);

    let denied = h.manager.create_route("driver-1", &three_orders(), &constraints()).await;

    assert!(matches!(
        denied,
        Err(ApplicationError::Domain(DomainError::PersistenceUnavailable { .. }))
    ));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = harness();
    let denied = h.manager.complete_delivery(Uuid::new_v4(), Uuid::new_v4(), None, None).await;
    assert!(matches!(denied, Err(ApplicationError::RouteNotFound { .. })));
}

#[tokio::test]
async fn test_create_route_starts_from_live_driver_position() {
    let h = harness();
    h.locations.set_position("driver-1", GeoPoint::new(43.6532, -79.3832)).await;
    let mut urgent = order("order-urgent", "250 Front St W, Toronto");
    urgent.priority = Priority::Urgent;
    let now = Utc::now();
    urgent.time_window = Some(TimeWindow::new(now, now + Duration::minutes(45)));
    let orders = vec![order("order-1", "100 Queen St W, Toronto"), urgent];

    let route = h.manager.create_route("driver-1", &orders, &constraints()).await.unwrap();

    assert_eq!(route.stops.len(), 2);
    assert!(route.stops.iter().all(|s| s.estimated_arrival.is_some()));
    assert_eq!(route.metrics.candidates_evaluated, 3);
}
