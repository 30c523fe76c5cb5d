pub mod bounds;
pub mod ids;
pub mod math;
pub mod position;
pub mod route;
pub mod time;

// Foundation crate: small, well-tested geodesy primitives only.
pub use bounds::*;
pub use ids::*;
pub use position::*;
pub use route::*;
pub use time::*;
