//! The capability interface the test process calls.
//!
//! ```text
//!  test code ──► ButlerClient ──route──► RemoteButler ──rpc──► privileged peer (LocalButler)
//!                     │
//!                     └──────route──► fallback (LocalButler over adb shell)
//! ```
//!
//! Every operation is synchronous and answers `Ok(bool)` ("did the state
//! change get applied") or an error. Arguments with a closed value set are
//! typed ([`Rotation`], [`LocationMode`]) and validated before any I/O.

mod client;
mod remote;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{ButlerClient, Route, RoutingTable};
pub use remote::RemoteButler;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{LOCATION_MODE_MIN_LEVEL, SVC_DATA_MIN_LEVEL, WIFI_PRIVILEGED_MIN_LEVEL};
use crate::error::{ButlerError, Result};
use crate::shell::SystemShell;

/// Screen rotation, in 90° steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    /// Natural orientation.
    Rotation0,
    /// 90° counter-clockwise.
    Rotation90,
    /// Upside down.
    Rotation180,
    /// 270° counter-clockwise.
    Rotation270,
}

impl Rotation {
    /// Platform value (0..=3).
    pub fn value(self) -> i32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 1,
            Self::Rotation180 => 2,
            Self::Rotation270 => 3,
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = ButlerError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Rotation0),
            1 => Ok(Self::Rotation90),
            2 => Ok(Self::Rotation180),
            3 => Ok(Self::Rotation270),
            other => Err(ButlerError::Validation(format!(
                "invalid screen rotation {other}, expected 0..=3"
            ))),
        }
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.value()
    }
}

/// Location services mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum LocationMode {
    /// Location off.
    Off,
    /// GPS only.
    SensorsOnly,
    /// Network only.
    BatterySaving,
    /// GPS and network.
    HighAccuracy,
}

impl LocationMode {
    /// Platform value (0..=3).
    pub fn value(self) -> i32 {
        match self {
            Self::Off => 0,
            Self::SensorsOnly => 1,
            Self::BatterySaving => 2,
            Self::HighAccuracy => 3,
        }
    }

    /// Allowed-providers string for platforms without a location mode.
    pub fn providers(self) -> &'static str {
        match self {
            Self::Off => "",
            Self::BatterySaving => "passive",
            Self::SensorsOnly => "passive,gps",
            Self::HighAccuracy => "passive,network,gps",
        }
    }
}

impl TryFrom<i32> for LocationMode {
    type Error = ButlerError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::SensorsOnly),
            2 => Ok(Self::BatterySaving),
            3 => Ok(Self::HighAccuracy),
            other => Err(ButlerError::Validation(format!("unknown location mode: {other}"))),
        }
    }
}

impl From<LocationMode> for i32 {
    fn from(mode: LocationMode) -> Self {
        mode.value()
    }
}

/// Platform API level of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformVersion(pub u32);

impl PlatformVersion {
    /// Read the device's API level with `getprop ro.build.version.sdk`.
    ///
    /// # Errors
    ///
    /// The command failed or printed something other than a level.
    pub fn detect(shell: &dyn SystemShell) -> Result<Self> {
        let output = shell.exec("getprop", &["ro.build.version.sdk"])?;
        let level = output.trim();
        level.parse().map(Self).map_err(|_| ButlerError::Protocol {
            reason: format!("unexpected ro.build.version.sdk: {level:?}"),
        })
    }

    /// Whether wifi toggling needs the privileged peer.
    pub fn wifi_needs_privilege(self) -> bool {
        self.0 >= WIFI_PRIVILEGED_MIN_LEVEL
    }

    /// Whether the platform has `location_mode`.
    pub fn has_location_mode(self) -> bool {
        self.0 >= LOCATION_MODE_MIN_LEVEL
    }

    /// Whether `svc data` exists.
    pub fn has_svc_data(self) -> bool {
        self.0 >= SVC_DATA_MIN_LEVEL
    }
}

/// Every operation of the capability interface.
///
/// Transaction codes start at 1; the terminate code lives at the top of the
/// user range and is never one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Turn wifi on or off.
    SetWifiEnabled,
    /// Change the location mode.
    SetLocationMode,
    /// Lock the screen rotation.
    SetRotation,
    /// Turn mobile data on or off.
    SetGsmDataEnabled,
    /// Grant a runtime permission.
    GrantPermission,
    /// Turn the spell checker on or off.
    SetSpellCheckerEnabled,
    /// Show or hide the soft keyboard alongside a hardware keyboard.
    SetShowImeWithHardKeyboard,
    /// Show or suppress the immersive-mode confirmation.
    SetImmersiveModeConfirmation,
    /// Toggle "don't keep activities".
    SetAlwaysFinishActivities,
    /// Turn the butler accessibility service on or off.
    SetAccessibilityServiceEnabled,
    /// Revoke a runtime permission.
    RevokePermission,
}

impl Operation {
    /// All operations, in transaction-code order.
    pub const ALL: [Operation; 11] = [
        Self::SetWifiEnabled,
        Self::SetLocationMode,
        Self::SetRotation,
        Self::SetGsmDataEnabled,
        Self::GrantPermission,
        Self::SetSpellCheckerEnabled,
        Self::SetShowImeWithHardKeyboard,
        Self::SetImmersiveModeConfirmation,
        Self::SetAlwaysFinishActivities,
        Self::SetAccessibilityServiceEnabled,
        Self::RevokePermission,
    ];

    /// Transaction code on the wire.
    pub fn code(self) -> u32 {
        match self {
            Self::SetWifiEnabled => 1,
            Self::SetLocationMode => 2,
            Self::SetRotation => 3,
            Self::SetGsmDataEnabled => 4,
            Self::GrantPermission => 5,
            Self::SetSpellCheckerEnabled => 6,
            Self::SetShowImeWithHardKeyboard => 7,
            Self::SetImmersiveModeConfirmation => 8,
            Self::SetAlwaysFinishActivities => 9,
            Self::SetAccessibilityServiceEnabled => 10,
            Self::RevokePermission => 11,
        }
    }

    /// Operation for a transaction code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Name used in logs and remote errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::SetWifiEnabled => "setWifiState",
            Self::SetLocationMode => "setLocationMode",
            Self::SetRotation => "setRotation",
            Self::SetGsmDataEnabled => "setGsmState",
            Self::GrantPermission => "grantPermission",
            Self::SetSpellCheckerEnabled => "setSpellCheckerState",
            Self::SetShowImeWithHardKeyboard => "setShowImeWithHardKeyboardState",
            Self::SetImmersiveModeConfirmation => "setImmersiveModeConfirmation",
            Self::SetAlwaysFinishActivities => "setAlwaysFinishActivitiesState",
            Self::SetAccessibilityServiceEnabled => "setAccessibilityServiceState",
            Self::RevokePermission => "revokePermission",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The operations a butler implementation provides.
pub trait ButlerApi: Send + Sync {
    /// Turn wifi on or off.
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool>;

    /// Set the location services mode.
    fn set_location_mode(&self, mode: LocationMode) -> Result<bool>;

    /// Lock the screen to `rotation`.
    fn set_rotation(&self, rotation: Rotation) -> Result<bool>;

    /// Turn mobile data on or off.
    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool>;

    /// Grant `permission` to `package`.
    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool>;

    /// Revoke `permission` from `package`.
    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool>;

    /// Turn the spell checker on or off.
    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool>;

    /// Choose whether the soft keyboard appears with a hardware keyboard.
    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool>;

    /// Show (`true`) or suppress (`false`) the immersive-mode confirmation.
    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool>;

    /// Toggle "don't keep activities".
    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool>;

    /// Turn the butler accessibility service on or off.
    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool>;

    /// Whether this implementation can perform `op` at all.
    fn supports(&self, op: Operation) -> bool {
        let _ = op;
        true
    }
}

impl<T: ButlerApi + ?Sized> ButlerApi for Arc<T> {
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool> {
        (**self).set_wifi_enabled(enabled)
    }

    fn set_location_mode(&self, mode: LocationMode) -> Result<bool> {
        (**self).set_location_mode(mode)
    }

    fn set_rotation(&self, rotation: Rotation) -> Result<bool> {
        (**self).set_rotation(rotation)
    }

    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool> {
        (**self).set_gsm_data_enabled(enabled)
    }

    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool> {
        (**self).grant_permission(package, permission)
    }

    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool> {
        (**self).revoke_permission(package, permission)
    }

    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool> {
        (**self).set_spell_checker_enabled(enabled)
    }

    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool> {
        (**self).set_show_ime_with_hard_keyboard(enabled)
    }

    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool> {
        (**self).set_immersive_mode_confirmation(enabled)
    }

    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool> {
        (**self).set_always_finish_activities(enabled)
    }

    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool> {
        (**self).set_accessibility_service_enabled(enabled)
    }

    fn supports(&self, op: Operation) -> bool {
        (**self).supports(op)
    }
}
