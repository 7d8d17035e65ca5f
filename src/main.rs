use chrono::{Duration, Utc};
use std::error::Error;
use std::sync::Arc;
use tracing::{info, warn};

use shiftroute::adapters::outbound::{InMemoryOrderSource, InMemoryRouteStore, StaticLocationFeed};
use shiftroute::application::{DriverStatusUpdate, RealTimeReoptimizer, RouteStateManager};
use shiftroute::domains::geo::{DistanceEstimator, GeoPoint, GeoResolver, RateLimiter};
use shiftroute::domains::routing::optimizer::{RouteOptimizerEngine, SimulatedTraffic};
use shiftroute::domains::routing::types::{
    Order, OrderStatus, Priority, TimeWindow, VehicleConstraints, WorkingHours,
};
use shiftroute::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting shiftroute");

    let config = match Config::from_file("config.toml").await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "config.toml not loaded, using defaults");
            Config::default()
        }
    };

    // Wire the services with the in-memory adapters. A deployment swaps in
    // real ports here without touching the engine.
    let store = Arc::new(InMemoryRouteStore::new());
    let orders = Arc::new(InMemoryOrderSource::new());
    let locations = Arc::new(StaticLocationFeed::new());
    let limiter = Arc::new(RateLimiter::new(std::time::Duration::from_millis(
        config.geocoding.min_request_interval_ms,
    )));
    let geocoder = Arc::new(shiftroute::adapters::outbound::NominatimGeocoder::new(
        config.geocoding.clone(),
    )?);
    let resolver = Arc::new(GeoResolver::new(geocoder, limiter, config.geocoding.clone()));
    let estimator = Arc::new(DistanceEstimator::new(config.distance.clone()));
    let traffic = Arc::new(SimulatedTraffic::new(Duration::seconds(
        config.optimizer.traffic_refresh_secs as i64,
    )));
    let engine = Arc::new(RouteOptimizerEngine::new(
        estimator.clone(),
        traffic,
        config.optimizer.clone(),
    ));
    let manager = RouteStateManager::new(
        store,
        orders.clone(),
        locations.clone(),
        resolver,
        engine.clone(),
        config.clone(),
    );
    let reoptimizer = RealTimeReoptimizer::new(engine, estimator, config.reoptimizer.clone());

    // Demo shift: three downtown orders, one with a tight window.
    let now = Utc::now();
    let demo_orders = vec![
        demo_order("order-1", "100 Queen St W, Toronto", Priority::Normal, None),
        demo_order(
            "order-2",
            "250 Front St W, Toronto",
            Priority::Urgent,
            Some(TimeWindow::new(now, now + Duration::minutes(45))),
        ),
        demo_order("order-3", "1 Austin Terrace, Toronto", Priority::Low, None),
    ];
    for order in &demo_orders {
        orders.put_order(order.clone()).await;
    }
    locations
        .set_position("driver-1", GeoPoint::new(43.6532, -79.3832))
        .await;

    let constraints = VehicleConstraints {
        max_capacity: 100.0,
        current_load: 20.0,
        max_stops: 50,
        working_hours: Some(WorkingHours {
            start: now,
            end: now + Duration::hours(8),
        }),
    };

    let route = manager.create_route("driver-1", &demo_orders, &constraints).await?;
    info!(
        route_id = %route.id,
        algorithm = %route.metrics.algorithm,
        total_km = route.total_distance_km,
        "route created"
    );
    for stop in &route.stops {
        info!(
            sequence = stop.sequence,
            order_id = %stop.order_id,
            eta = ?stop.estimated_arrival,
            leg_km = stop.estimated_distance_km,
            "stop"
        );
    }

    let first = route.stops[0].id;
    let route = manager
        .complete_delivery(route.id, first, Some(12.0), Some(2.4))
        .await?;
    info!(completed_km = route.completed_distance_km, "first delivery completed");

    // A status update after the driver has moved across town.
    let update = DriverStatusUpdate {
        driver_id: "driver-1".to_string(),
        position: Some(GeoPoint::new(43.6426, -79.3871)),
        fuel_level_pct: Some(40.0),
        current_load: 15.0,
        timestamp: Utc::now(),
    };
    let pending = manager_pending(&route, &demo_orders, &config);
    let report = reoptimizer
        .process_update(&update, &route, &pending, &constraints, Utc::now())
        .await;
    for alert in &report.alerts {
        info!(alert, "reoptimizer alert");
    }
    info!(reoptimized = report.reoptimized, "status update processed");

    let route = manager.end_shift(route.id).await?;
    info!(route_id = %route.id, history_entries = route.history.len(), "shift ended");

    Ok(())
}

fn demo_order(
    id: &str,
    address: &str,
    priority: Priority,
    time_window: Option<TimeWindow>,
) -> Order {
    Order {
        id: id.to_string(),
        delivery_address: address.to_string(),
        priority,
        time_window,
        package_weight: Some(5.0),
        special_requirements: Vec::new(),
        status: OrderStatus::Pending,
    }
}

fn manager_pending(
    route: &shiftroute::domains::routing::route::PersistentRoute,
    orders: &[Order],
    config: &Config,
) -> Vec<shiftroute::domains::routing::types::DeliveryStop> {
    route
        .pending_stops()
        .into_iter()
        .filter_map(|stop| {
            orders.iter().find(|o| o.id == stop.order_id).map(|order| {
                shiftroute::domains::routing::types::DeliveryStop::from_order(
                    order,
                    stop.point,
                    config.optimizer.default_service_time_min,
                )
            })
        })
        .collect()
}
