//! Location services mode.
//!
//! KitKat and later have a single `location_mode` integer. Older platforms
//! only know the comma-separated list of allowed providers, so each mode is
//! mapped onto the provider set it implies.

use serde::{Deserialize, Serialize};

use super::read_int_or;
use crate::api::{LocationMode, PlatformVersion};
use crate::error::Result;
use crate::settings::{keys, Namespace, SettingsAccessor};

/// How location is written on this platform. Chosen once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStrategy {
    /// `secure/location_mode`.
    Mode,
    /// `secure/location_providers_allowed`.
    Providers,
}

/// Location setting as found before the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LocationState {
    /// Saved `location_mode`.
    Mode(i32),
    /// Saved allowed providers.
    Providers(String),
}

impl LocationStrategy {
    /// Strategy for `platform`.
    pub fn for_platform(platform: PlatformVersion) -> Self {
        if platform.has_location_mode() {
            Self::Mode
        } else {
            Self::Providers
        }
    }

    /// Switch to `mode`.
    pub fn apply(self, settings: &dyn SettingsAccessor, mode: LocationMode) -> Result<bool> {
        log::debug!("[location] setting location mode {mode:?}");
        match self {
            Self::Mode => settings.put_int(Namespace::Secure, keys::LOCATION_MODE, mode.value()),
            Self::Providers => settings.put_string(
                Namespace::Secure,
                keys::LOCATION_PROVIDERS_ALLOWED,
                mode.providers(),
            ),
        }
    }

    /// Read the current location setting.
    pub fn save(self, settings: &dyn SettingsAccessor) -> LocationState {
        match self {
            Self::Mode => LocationState::Mode(read_int_or(
                settings,
                Namespace::Secure,
                keys::LOCATION_MODE,
                LocationMode::Off.value(),
            )),
            Self::Providers => {
                let providers = settings
                    .get_string(Namespace::Secure, keys::LOCATION_PROVIDERS_ALLOWED)
                    .unwrap_or_else(|e| {
                        log::warn!("[location] reading allowed providers failed: {e}");
                        None
                    });
                LocationState::Providers(providers.unwrap_or_default())
            }
        }
    }
}

/// Write back a saved location setting.
pub fn restore(settings: &dyn SettingsAccessor, state: &LocationState) -> Result<bool> {
    match state {
        LocationState::Mode(mode) => settings.put_int(Namespace::Secure, keys::LOCATION_MODE, *mode),
        LocationState::Providers(providers) => {
            settings.put_string(Namespace::Secure, keys::LOCATION_PROVIDERS_ALLOWED, providers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;

    #[test]
    fn test_mode_strategy_writes_integer() {
        let store = SettingsStore::in_memory();
        let strategy = LocationStrategy::for_platform(PlatformVersion(23));
        assert_eq!(strategy, LocationStrategy::Mode);
        assert!(strategy.apply(&store, LocationMode::BatterySaving).unwrap());
        assert_eq!(store.get_int(Namespace::Secure, keys::LOCATION_MODE).unwrap(), 2);
    }

    #[test]
    fn test_providers_strategy_on_old_platforms() {
        let store = SettingsStore::in_memory();
        let strategy = LocationStrategy::for_platform(PlatformVersion(18));
        assert_eq!(strategy, LocationStrategy::Providers);
        strategy.apply(&store, LocationMode::HighAccuracy).unwrap();
        assert_eq!(
            store
                .get_string(Namespace::Secure, keys::LOCATION_PROVIDERS_ALLOWED)
                .unwrap()
                .as_deref(),
            Some("passive,network,gps")
        );
    }

    #[test]
    fn test_save_and_restore() {
        let store = SettingsStore::in_memory();
        store.put_int(Namespace::Secure, keys::LOCATION_MODE, 3).unwrap();
        let saved = LocationStrategy::Mode.save(&store);
        assert_eq!(saved, LocationState::Mode(3));

        LocationStrategy::Mode.apply(&store, LocationMode::Off).unwrap();
        restore(&store, &saved).unwrap();
        assert_eq!(store.get_int(Namespace::Secure, keys::LOCATION_MODE).unwrap(), 3);
    }
}
