pub mod geo;
pub mod routing;
