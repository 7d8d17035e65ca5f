pub mod geocoding;
pub mod in_memory;

pub use geocoding::*;
pub use in_memory::*;
