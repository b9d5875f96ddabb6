//! Access to the platform's key/value settings tables.
//!
//! Three tables exist (`global`, `system`, `secure`). Everything the butler
//! changes and restores goes through [`SettingsAccessor`]:
//!
//! - [`SettingsStore`] - in-process tables, optionally persisted to a JSON file
//! - [`CommandSettings`] - the platform `settings get|put` tool over any
//!   [`SystemShell`](crate::shell::SystemShell)

mod command;
mod store;

pub use command::CommandSettings;
pub use store::{SettingsStore, SettingsTables};

use serde::{Deserialize, Serialize};

use crate::error::{ButlerError, Result};

/// Settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Device-wide settings.
    Global,
    /// Per-user system preferences.
    System,
    /// Per-user secure preferences.
    Secure,
}

impl Namespace {
    /// Name used by the `settings` tool.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::System => "system",
            Self::Secure => "secure",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known setting keys.
pub mod keys {
    /// system: 1 when the accelerometer drives rotation.
    pub const ACCELEROMETER_ROTATION: &str = "accelerometer_rotation";
    /// system: fixed rotation (0..=3) when the accelerometer is off.
    pub const USER_ROTATION: &str = "user_rotation";
    /// secure: location mode (KitKat and later).
    pub const LOCATION_MODE: &str = "location_mode";
    /// secure: comma-separated allowed providers (before KitKat).
    pub const LOCATION_PROVIDERS_ALLOWED: &str = "location_providers_allowed";
    /// secure: 1 when the spell checker is on.
    pub const SPELL_CHECKER_ENABLED: &str = "spell_checker_enabled";
    /// secure: 1 when the soft keyboard shows with a hardware keyboard.
    pub const SHOW_IME_WITH_HARD_KEYBOARD: &str = "show_ime_with_hard_keyboard";
    /// secure: `confirmed` once the immersive-mode hint was dismissed.
    pub const IMMERSIVE_MODE_CONFIRMATIONS: &str = "immersive_mode_confirmations";
    /// secure: colon-separated enabled accessibility services.
    pub const ENABLED_ACCESSIBILITY_SERVICES: &str = "enabled_accessibility_services";
    /// secure: 1 when accessibility is on.
    pub const ACCESSIBILITY_ENABLED: &str = "accessibility_enabled";
    /// global (system before JB MR1): destroy activities as soon as they stop.
    pub const ALWAYS_FINISH_ACTIVITIES: &str = "always_finish_activities";
    /// global: window animation scale.
    pub const WINDOW_ANIMATION_SCALE: &str = "window_animation_scale";
    /// global: transition animation scale.
    pub const TRANSITION_ANIMATION_SCALE: &str = "transition_animation_scale";
    /// global: animator duration scale.
    pub const ANIMATOR_DURATION_SCALE: &str = "animator_duration_scale";
    /// global: 1 hides crash and ANR dialogs.
    pub const HIDE_ERROR_DIALOGS: &str = "hide_error_dialogs";
    /// global: mobile data on/off (before Lollipop's `svc data`).
    pub const MOBILE_DATA: &str = "mobile_data";
}

/// Reads and writes settings.
pub trait SettingsAccessor: Send + Sync {
    /// Value of `key`, or `None` if it was never written.
    fn get_string(&self, namespace: Namespace, key: &str) -> Result<Option<String>>;

    /// Write `value` to `key`. Returns whether the write was accepted.
    fn put_string(&self, namespace: Namespace, key: &str, value: &str) -> Result<bool>;

    /// Integer value of `key`.
    ///
    /// # Errors
    ///
    /// [`ButlerError::SettingNotFound`] if the key is missing or not an integer.
    fn get_int(&self, namespace: Namespace, key: &str) -> Result<i32> {
        let not_found = || ButlerError::SettingNotFound {
            namespace,
            key: key.to_string(),
        };
        let value = self.get_string(namespace, key)?.ok_or_else(not_found)?;
        value.trim().parse().map_err(|e| {
            log::debug!("[settings] {namespace}/{key}={value:?} is not an integer: {e}");
            not_found()
        })
    }

    /// Write an integer value.
    fn put_int(&self, namespace: Namespace, key: &str, value: i32) -> Result<bool> {
        self.put_string(namespace, key, &value.to_string())
    }
}
