pub mod cache;
pub mod distance;
pub mod limiter;
pub mod ports;
pub mod resolver;
pub mod types;

pub use cache::*;
pub use distance::*;
pub use limiter::*;
pub use ports::*;
pub use resolver::*;
pub use types::*;
