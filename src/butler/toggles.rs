//! On/off settings that are saved, overridden and restored as booleans.

use crate::api::PlatformVersion;
use crate::error::Result;
use crate::settings::{keys, Namespace, SettingsAccessor};

/// First platform level where `always_finish_activities` lives in `global`.
const ALWAYS_FINISH_GLOBAL_MIN_LEVEL: u32 = 17;

/// Value of `immersive_mode_confirmations` once the hint has been shown.
const IMMERSIVE_CONFIRMED: &str = "confirmed";

/// A boolean device setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Spell checker.
    SpellChecker,
    /// Soft keyboard alongside a hardware keyboard.
    ShowImeWithHardKeyboard,
    /// Immersive-mode confirmation hint.
    ImmersiveModeConfirmation,
    /// "Don't keep activities".
    AlwaysFinishActivities,
}

impl Toggle {
    /// Table and key holding this toggle on `platform`.
    pub fn location(self, platform: PlatformVersion) -> (Namespace, &'static str) {
        match self {
            Self::SpellChecker => (Namespace::Secure, keys::SPELL_CHECKER_ENABLED),
            Self::ShowImeWithHardKeyboard => (Namespace::Secure, keys::SHOW_IME_WITH_HARD_KEYBOARD),
            Self::ImmersiveModeConfirmation => (Namespace::Secure, keys::IMMERSIVE_MODE_CONFIRMATIONS),
            Self::AlwaysFinishActivities if platform.0 >= ALWAYS_FINISH_GLOBAL_MIN_LEVEL => {
                (Namespace::Global, keys::ALWAYS_FINISH_ACTIVITIES)
            }
            Self::AlwaysFinishActivities => (Namespace::System, keys::ALWAYS_FINISH_ACTIVITIES),
        }
    }

    /// Current state of the toggle.
    pub fn read(self, settings: &dyn SettingsAccessor, platform: PlatformVersion) -> Result<bool> {
        let (namespace, key) = self.location(platform);
        match self {
            // The hint is shown until the key says it was confirmed.
            Self::ImmersiveModeConfirmation => {
                Ok(settings.get_string(namespace, key)?.as_deref() != Some(IMMERSIVE_CONFIRMED))
            }
            _ => Ok(settings.get_int(namespace, key)? == 1),
        }
    }

    /// Current state, or `false` (with a warning) when unreadable.
    pub fn read_or_off(self, settings: &dyn SettingsAccessor, platform: PlatformVersion) -> bool {
        self.read(settings, platform).unwrap_or_else(|e| {
            log::warn!("[toggles] reading {self:?} failed, assuming off: {e}");
            false
        })
    }

    /// Turn the toggle on or off.
    pub fn write(self, settings: &dyn SettingsAccessor, platform: PlatformVersion, enabled: bool) -> Result<bool> {
        let (namespace, key) = self.location(platform);
        log::debug!("[toggles] {namespace}/{key} -> {enabled}");
        match self {
            Self::ImmersiveModeConfirmation => {
                settings.put_string(namespace, key, if enabled { "" } else { IMMERSIVE_CONFIRMED })
            }
            _ => settings.put_int(namespace, key, i32::from(enabled)),
        }
    }
}
