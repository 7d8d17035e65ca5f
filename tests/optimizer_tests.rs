use chrono::{Duration, Utc};
use std::sync::Arc;

use shiftroute::config::Config;
use shiftroute::domains::geo::{DistanceEstimator, GeoPoint};
use shiftroute::domains::routing::optimizer::{FreeFlowTraffic, RouteOptimizerEngine};
use shiftroute::domains::routing::types::{
    DeliveryStop, Priority, TimeWindow, VehicleConstraints, WorkingHours,
};

fn engine_with_timeout(timeout_secs: u64) -> RouteOptimizerEngine {
    let defaults = Config::default();
    let mut optimizer = defaults.optimizer;
    optimizer.timeout_secs = timeout_secs;
    RouteOptimizerEngine::new(
        Arc::new(DistanceEstimator::new(defaults.distance)),
        Arc::new(FreeFlowTraffic),
        optimizer,
    )
}

fn engine() -> RouteOptimizerEngine {
    engine_with_timeout(30)
}

fn stop(order_id: &str, lat: f64, lon: f64) -> DeliveryStop {
    DeliveryStop {
        id: format!("stop-{}", order_id),
        point: GeoPoint::new(lat, lon),
        time_window: None,
        service_time_min: 5.0,
        package_weight: Some(2.0),
        priority: Priority::Normal,
        special_requirements: Vec::new(),
        order_id: order_id.to_string(),
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

fn downtown() -> GeoPoint {
    GeoPoint::new(43.6532, -79.3832)
}

#[test]
fn test_result_is_permutation_of_inputs() {
    let stops: Vec<DeliveryStop> = (0..10)
        .map(|i| {
            stop(
                &format!("order-{}", i),
                43.60 + (i as f64) * 0.012,
                -79.45 + (i as f64) * 0.009,
            )
        })
        .collect();

    let result = engine().optimize(downtown(), &stops, &constraints(), Utc::now());

    assert!(result.is_valid, "errors: {:?}", result.errors);
    let mut seen = result.sequence.clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<usize>>());
    assert_eq!(result.planned_stops.len(), 10);
}

#[test]
fn test_zero_timeout_degrades_to_sequential_fallback() {
    let stops = vec![
        stop("order-1", 43.66, -79.38),
        stop("order-2", 43.64, -79.39),
        stop("order-3", 43.70, -79.40),
    ];

    let result = engine_with_timeout(0).optimize(downtown(), &stops, &constraints(), Utc::now());

    assert_eq!(result.algorithm, "sequential_fallback");
    assert!(!result.is_valid);
    assert!(!result.errors.is_empty());
    // Fallback preserves the input order and still covers every stop.
    assert_eq!(result.sequence, vec![0, 1, 2]);
}

#[test]
fn test_nearby_normal_stop_beats_urgent_detour() {
    // An urgent order with a closing window sits farther out than a normal
    // one. The urgency ordering visits it first, but that route is longer,
    // so the distance comparison keeps the nearest-first candidate.
    let now = Utc::now();
    let mut urgent = stop("order-urgent", 43.64, -79.39);
    urgent.priority = Priority::Urgent;
    urgent.time_window = Some(TimeWindow::new(now, now + Duration::minutes(20)));
    let stops = vec![stop("order-near", 43.66, -79.38), urgent];

    let result = engine().optimize(downtown(), &stops, &constraints(), now);

    assert!(result.is_valid, "errors: {:?}", result.errors);
    assert_eq!(result.candidates_evaluated, 3);
    assert_eq!(result.sequence, vec![0, 1]);
    assert_eq!(result.algorithm, "nearest_from_start");
}

#[test]
fn test_overloaded_vehicle_degrades_softly() {
    // Load 9 of 10 plus a 5 kg package exceeds even the 120% overload
    // allowance, so the feasibility filter would exclude everything. The
    // engine optimizes over all valid stops instead and says so.
    let mut heavy = stop("order-heavy", 43.66, -79.38);
    heavy.package_weight = Some(5.0);
    let constraints = VehicleConstraints {
        max_capacity: 10.0,
        current_load: 9.0,
        max_stops: 50,
        working_hours: None,
    };

    let result = engine().optimize(downtown(), &[heavy], &constraints, Utc::now());

    assert!(result.is_valid, "errors: {:?}", result.errors);
    assert_eq!(result.sequence, vec![0]);
    assert!(
        result.warnings.iter().any(|w| w.contains("feasibility")),
        "warnings: {:?}",
        result.warnings
    );
}

#[test]
fn test_window_far_outside_shift_is_excluded() {
    let now = Utc::now();
    let mut stale = stop("order-stale", 43.64, -79.39);
    stale.time_window = Some(TimeWindow::new(now - Duration::hours(10), now - Duration::hours(5)));
    let stops = vec![stop("order-live", 43.66, -79.38), stale];
    let constraints = VehicleConstraints {
        working_hours: Some(WorkingHours {
            start: now,
            end: now + Duration::hours(8),
        }),
        ..constraints()
    };

    let result = engine().optimize(downtown(), &stops, &constraints, now);

    assert!(result.is_valid, "errors: {:?}", result.errors);
    assert_eq!(result.sequence, vec![0]);
}

#[test]
fn test_malformed_start_is_rejected() {
    let stops = vec![stop("order-1", 43.66, -79.38)];
    let result = engine().optimize(GeoPoint::new(200.0, -79.38), &stops, &constraints(), Utc::now());

    assert!(!result.is_valid);
    assert!(result.errors.iter().any(|e| e.contains("malformed start")));
    assert!(result.sequence.is_empty());
}

#[test]
fn test_inconsistent_constraints_are_rejected() {
    let stops = vec![stop("order-1", 43.66, -79.38)];
    let constraints = VehicleConstraints {
        max_capacity: 10.0,
        current_load: 20.0,
        max_stops: 50,
        working_hours: None,
    };

    let result = engine().optimize(downtown(), &stops, &constraints, Utc::now());

    assert!(!result.is_valid);
    assert!(result.errors.iter().any(|e| e.contains("constraints")));
}

#[test]
fn test_stop_cap_is_enforced() {
    let stops: Vec<DeliveryStop> = (0..101)
        .map(|i| stop(&format!("order-{}", i), 43.6, -79.4))
        .collect();

    let result = engine().optimize(downtown(), &stops, &constraints(), Utc::now());

    assert!(!result.is_valid);
    assert!(result.errors.iter().any(|e| e.contains("cap")));
}

#[test]
fn test_no_stops_is_a_valid_empty_route() {
    let result = engine().optimize(downtown(), &[], &constraints(), Utc::now());

    assert!(result.is_valid);
    assert!(result.sequence.is_empty());
    assert_eq!(result.algorithm, "none");
    assert_eq!(result.total_distance_km, 0.0);
}

#[test]
fn test_malformed_stop_is_dropped_with_warning() {
    let stops = vec![
        stop("order-1", 43.66, -79.38),
        stop("order-bad", f64::NAN, -79.39),
        stop("order-3", 43.70, -79.40),
    ];

    let result = engine().optimize(downtown(), &stops, &constraints(), Utc::now());

    assert!(result.is_valid, "errors: {:?}", result.errors);
    let mut seen = result.sequence.clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 2]);
    assert!(result.warnings.iter().any(|w| w.contains("order-bad")));
}

#[test]
fn test_hybrid_skipped_beyond_cluster_limit() {
    let stops: Vec<DeliveryStop> = (0..9)
        .map(|i| {
            stop(
                &format!("order-{}", i),
                43.60 + (i as f64) * 0.01,
                -79.45 + (i as f64) * 0.01,
            )
        })
        .collect();

    let result = engine().optimize(downtown(), &stops, &constraints(), Utc::now());

    assert!(result.is_valid, "errors: {:?}", result.errors);
    assert_eq!(result.candidates_evaluated, 2);
}

#[test]
fn test_planned_legs_carry_arrival_estimates() {
    let now = Utc::now();
    let stops = vec![stop("order-1", 43.66, -79.38), stop("order-2", 43.64, -79.39)];

    let result = engine().optimize(downtown(), &stops, &constraints(), now);

    assert!(result.is_valid);
    let mut previous = now;
    for planned in &result.planned_stops {
        assert!(planned.estimated_arrival > previous);
        assert!(planned.leg_distance_km > 0.0);
        assert!(planned.traffic_multiplier >= 1.0);
        previous = planned.estimated_arrival;
    }
    let leg_sum: f64 = result.planned_stops.iter().map(|p| p.leg_distance_km).sum();
    assert!((leg_sum - result.total_distance_km).abs() < 1e-9);
}
