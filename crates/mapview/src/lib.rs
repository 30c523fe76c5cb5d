//! Keeps an interactive map in sync with an edited route.
//!
//! A [`MapView`] owns two update loops (route geometry and selection), a
//! callback channel back from the rendering surface and a small worker pool.
//! User gestures reported by the surface become edits of the shared
//! [`PositionStore`]; edits raise dirty flags that the loops turn into
//! bounded batches of [`RenderCommand`]s.

pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod flags;
mod gestures;
pub mod listener;
pub mod preferences;
pub mod render;
pub mod state;
pub mod store;
pub mod surface;
mod updater;
pub mod waypoints;

#[cfg(test)]
mod testing;

pub use config::MapViewConfig;
pub use engine::MapView;
pub use enrich::{EnrichFields, Enricher, LocalEnricher};
pub use error::{EnrichError, MapViewError, SurfaceError};
pub use listener::MapViewListener;
pub use preferences::{MemoryPreferences, PreferenceValues, Preferences};
pub use store::{Column, Edit, ModelChange, PositionStore};
pub use surface::{RenderCommand, RenderSurface, SurfaceQuery, TravelMode, TravelOptions};
