pub mod reoptimizer;
pub mod route_service;

pub use reoptimizer::*;
pub use route_service::*;
