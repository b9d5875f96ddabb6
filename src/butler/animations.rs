//! Window, transition and animator scales.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::{keys, Namespace, SettingsAccessor};

/// The three global animation scale keys.
pub const SCALE_KEYS: [&str; 3] = [
    keys::WINDOW_ANIMATION_SCALE,
    keys::TRANSITION_ANIMATION_SCALE,
    keys::ANIMATOR_DURATION_SCALE,
];

/// Scale written when a key had no value before the session.
const DEFAULT_SCALE: &str = "1";

/// Raw scale strings as found before the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationScales {
    scales: BTreeMap<String, String>,
}

impl AnimationScales {
    /// Saved value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.scales.get(key).map(String::as_str)
    }
}

/// Read all three scales, keeping the raw strings.
pub fn save(settings: &dyn SettingsAccessor) -> AnimationScales {
    let scales = SCALE_KEYS
        .iter()
        .map(|key| {
            let value = match settings.get_string(Namespace::Global, key) {
                Ok(Some(value)) => value,
                Ok(None) => DEFAULT_SCALE.to_string(),
                Err(e) => {
                    log::warn!("[animations] reading {key} failed, assuming {DEFAULT_SCALE}: {e}");
                    DEFAULT_SCALE.to_string()
                }
            };
            ((*key).to_string(), value)
        })
        .collect();
    AnimationScales { scales }
}

/// Write `value` to every scale.
pub fn set_all(settings: &dyn SettingsAccessor, value: &str) -> Result<()> {
    for key in SCALE_KEYS {
        settings.put_string(Namespace::Global, key, value)?;
    }
    Ok(())
}

/// Write back saved scales. Every key is attempted; the first error is returned.
pub fn restore(settings: &dyn SettingsAccessor, saved: &AnimationScales) -> Result<()> {
    let mut first_error = None;
    for key in SCALE_KEYS {
        let value = saved.get(key).unwrap_or(DEFAULT_SCALE);
        if let Err(e) = settings.put_string(Namespace::Global, key, value) {
            log::warn!("[animations] restoring {key} failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;

    #[test]
    fn test_disable_then_restore_keeps_raw_strings() {
        let store = SettingsStore::in_memory();
        store.put_string(Namespace::Global, keys::WINDOW_ANIMATION_SCALE, "0.5").unwrap();
        store.put_string(Namespace::Global, keys::ANIMATOR_DURATION_SCALE, "1.0").unwrap();

        let saved = save(&store);
        set_all(&store, "0").unwrap();
        for key in SCALE_KEYS {
            assert_eq!(store.get_string(Namespace::Global, key).unwrap().as_deref(), Some("0"));
        }

        restore(&store, &saved).unwrap();
        let global = |key| store.get_string(Namespace::Global, key).unwrap();
        assert_eq!(global(keys::WINDOW_ANIMATION_SCALE).as_deref(), Some("0.5"));
        assert_eq!(global(keys::ANIMATOR_DURATION_SCALE).as_deref(), Some("1.0"));
        assert_eq!(global(keys::TRANSITION_ANIMATION_SCALE).as_deref(), Some("1"));
    }
}
