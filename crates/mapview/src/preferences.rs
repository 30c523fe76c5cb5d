use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Persisted user choices the engine reads or writes.
pub trait Preferences: Send + Sync {
    fn map_type(&self) -> Option<String>;
    fn set_map_type(&self, map_type: &str);
    fn clean_elevation_on_move(&self) -> bool;
    fn clean_time_on_move(&self) -> bool;
    fn complement_time_on_move(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceValues {
    pub map_type: Option<String>,
    pub clean_elevation_on_move: bool,
    pub clean_time_on_move: bool,
    pub complement_time_on_move: bool,
}

/// In-memory [`Preferences`].
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<PreferenceValues>,
}

impl MemoryPreferences {
    pub fn new(values: PreferenceValues) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn values(&self) -> PreferenceValues {
        self.values.read().clone()
    }
}

impl Preferences for MemoryPreferences {
    fn map_type(&self) -> Option<String> {
        self.values.read().map_type.clone()
    }

    fn set_map_type(&self, map_type: &str) {
        self.values.write().map_type = Some(map_type.to_string());
    }

    fn clean_elevation_on_move(&self) -> bool {
        self.values.read().clean_elevation_on_move
    }

    fn clean_time_on_move(&self) -> bool {
        self.values.read().clean_time_on_move
    }

    fn complement_time_on_move(&self) -> bool {
        self.values.read().complement_time_on_move
    }
}
