//! # Preference Store
//!
//! The user's board settings: chosen street, direction and whether vehicle
//! numbers are shown. Reads never fail (missing or unreadable records yield
//! the defaults) and writes are best-effort.

pub mod storage;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use storage::{FileStore, KeyValueStore, MemoryStore};

/// Fixed storage key of the settings record.
pub const SETTINGS_KEY: &str = "bus_settings";

/// Street selected on first run.
pub const DEFAULT_STREET: &str = "Талнахская";

fn default_direction() -> bool {
    true
}

/// Persisted board settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub street: String,
    /// `true` shows the "up" sequence.
    #[serde(default = "default_direction")]
    pub direction: bool,
    pub show_numbers: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            street: DEFAULT_STREET.to_string(),
            direction: true,
            show_numbers: true,
        }
    }
}

/// Partial update requested by rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub street: Option<String>,
    pub direction: Option<bool>,
    pub show_numbers: Option<bool>,
}

impl Preferences {
    /// Returns these preferences with every field set in `patch` replaced.
    pub fn patched(&self, patch: PreferencesPatch) -> Preferences {
        Preferences {
            street: patch.street.unwrap_or_else(|| self.street.clone()),
            direction: patch.direction.unwrap_or(self.direction),
            show_numbers: patch.show_numbers.unwrap_or(self.show_numbers),
        }
    }
}

/// Loads and saves [`Preferences`] through a [`KeyValueStore`].
#[derive(Clone)]
pub struct PreferenceStore {
    backend: Arc<dyn KeyValueStore>,
    defaults: Preferences,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_defaults(backend, Preferences::default())
    }

    /// Same as `new` but with a different first-run record.
    pub fn with_defaults(backend: Arc<dyn KeyValueStore>, defaults: Preferences) -> Self {
        Self { backend, defaults }
    }

    pub fn defaults(&self) -> &Preferences {
        &self.defaults
    }

    /// The stored record, or the defaults when absent or unreadable.
    pub fn load(&self) -> Preferences {
        match self.backend.get(SETTINGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Preferences>(&raw) {
                Ok(prefs) => prefs,
                Err(e) => {
                    log::warn!("Stored preferences are unreadable ({}); using defaults.", e);
                    self.defaults.clone()
                }
            },
            Ok(None) => self.defaults.clone(),
            Err(e) => {
                log::warn!("Failed to read preferences ({}); using defaults.", e);
                self.defaults.clone()
            }
        }
    }

    /// Persists `prefs`. Failures are logged and dropped.
    pub fn save(&self, prefs: &Preferences) {
        let raw = match serde_json::to_string(prefs) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Failed to serialize preferences: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.set(SETTINGS_KEY, &raw) {
            log::warn!("Failed to persist preferences: {}", e);
        }
    }

    /// Applies `patch` to the stored record and writes it through.
    pub fn update(&self, patch: PreferencesPatch) -> Preferences {
        let next = self.load().patched(patch);
        self.save(&next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable)
        }
    }

    #[test]
    fn test_empty_storage_yields_defaults() {
        let store = PreferenceStore::new(Arc::new(MemoryStore::new()));
        let prefs = store.load();

        assert_eq!(prefs.street, DEFAULT_STREET);
        assert!(prefs.direction);
        assert!(prefs.show_numbers);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = PreferenceStore::new(Arc::new(MemoryStore::new()));
        let prefs = Preferences { street: "Ленина".to_string(), direction: false, show_numbers: false };

        store.save(&prefs);
        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn test_file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(Arc::new(FileStore::new(dir.path().join("nested"))));
        let prefs = Preferences { street: "Кайеркан".to_string(), direction: true, show_numbers: false };

        store.save(&prefs);

        let raw = std::fs::read_to_string(dir.path().join("nested").join("bus_settings.json")).unwrap();
        assert!(raw.contains("\"showNumbers\":false"));
        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn test_missing_direction_defaults_to_up() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(SETTINGS_KEY, r#"{"street":"Ленина","showNumbers":false}"#).unwrap();

        let prefs = PreferenceStore::new(backend).load();
        assert_eq!(prefs, Preferences { street: "Ленина".to_string(), direction: true, show_numbers: false });
    }

    #[test]
    fn test_unreadable_record_and_broken_backend_fall_back() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(SETTINGS_KEY, "not json").unwrap();
        assert_eq!(PreferenceStore::new(backend).load(), Preferences::default());

        let broken = PreferenceStore::new(Arc::new(BrokenStore));
        broken.save(&Preferences::default());
        assert_eq!(broken.load(), Preferences::default());
    }

    #[test]
    fn test_update_applies_partial_patch() {
        let store = PreferenceStore::new(Arc::new(MemoryStore::new()));
        let next = store.update(PreferencesPatch { direction: Some(false), ..Default::default() });

        assert_eq!(next.street, DEFAULT_STREET);
        assert!(!next.direction);
        assert_eq!(store.load(), next);
    }
}
