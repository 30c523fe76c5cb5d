//! Position reduction for rendering.
//!
//! Large routes are cut down in stages (hard cap, zoom significance, viewport,
//! even stride) so the rendering surface only ever receives a bounded,
//! representative subset.

pub mod cache;
pub mod reducer;
pub mod significance;

pub use cache::*;
pub use reducer::*;
pub use significance::*;
