use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Weight used by urgency and hybrid scoring.
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Urgent => 100.0,
            Priority::High => 75.0,
            Priority::Normal => 50.0,
            Priority::Low => 25.0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// The interval within which a delivery should ideally occur.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tier: Priority,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            tier: Priority::Normal,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Driver working hours for one shift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    OutForDelivery,
    Delivered,
    Cancelled,
}

/// External order shape supplied by the order source. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub delivery_address: String,
    pub priority: Priority,
    pub time_window: Option<TimeWindow>,
    pub package_weight: Option<f64>,
    pub special_requirements: Vec<String>,
    pub status: OrderStatus,
}

impl Order {
    pub fn is_deliverable(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::OutForDelivery)
    }
}

/// A single delivery location derived from an order. Created per optimization
/// call from external order data; never persisted independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStop {
    pub id: String,
    pub point: GeoPoint,
    pub time_window: Option<TimeWindow>,
    pub service_time_min: f64,
    pub package_weight: Option<f64>,
    pub priority: Priority,
    pub special_requirements: Vec<String>,
    pub order_id: String,
}

impl DeliveryStop {
    pub fn from_order(order: &Order, point: GeoPoint, service_time_min: f64) -> Self {
        Self {
            id: format!("stop-{}", order.id),
            point,
            time_window: order.time_window,
            service_time_min,
            package_weight: order.package_weight,
            priority: order.priority,
            special_requirements: order.special_requirements.clone(),
            order_id: order.id.clone(),
        }
    }
}

/// Vehicle limits supplied by the caller per optimization call. Immutable
/// within a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConstraints {
    pub max_capacity: f64,
    pub current_load: f64,
    pub max_stops: usize,
    pub working_hours: Option<WorkingHours>,
}

impl VehicleConstraints {
    pub fn validate(&self) -> Result<(), String> {
        if !self.max_capacity.is_finite() || self.max_capacity <= 0.0 {
            return Err(format!("max_capacity must be positive, got {}", self.max_capacity));
        }
        if !self.current_load.is_finite() || self.current_load < 0.0 {
            return Err(format!("current_load must be non-negative, got {}", self.current_load));
        }
        if self.current_load > self.max_capacity {
            return Err(format!(
                "current_load {} exceeds max_capacity {}",
                self.current_load, self.max_capacity
            ));
        }
        Ok(())
    }
}
