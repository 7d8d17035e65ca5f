pub mod optimizer;
pub mod ports;
pub mod route;
pub mod types;

pub use optimizer::*;
pub use ports::*;
pub use route::*;
pub use types::*;
