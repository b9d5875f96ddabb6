//! Operations that go through platform tools rather than settings.

use crate::api::PlatformVersion;
use crate::error::{ButlerError, Result};
use crate::settings::{keys, Namespace, SettingsAccessor};
use crate::shell::SystemShell;

/// First platform level with the `mobile_data` global setting.
const MOBILE_DATA_SETTING_MIN_LEVEL: u32 = 19;

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enable"
    } else {
        "disable"
    }
}

/// Turn wifi on or off with `svc wifi`.
pub fn set_wifi(shell: &dyn SystemShell, enabled: bool) -> Result<bool> {
    shell.exec("svc", &["wifi", on_off(enabled)])?;
    Ok(true)
}

/// Grant a runtime permission with `pm grant`.
pub fn grant_permission(shell: &dyn SystemShell, package: &str, permission: &str) -> Result<bool> {
    log::debug!("[permissions] granting {permission} to {package}");
    shell.exec("pm", &["grant", package, permission])?;
    Ok(true)
}

/// Revoke a runtime permission with `pm revoke`.
pub fn revoke_permission(shell: &dyn SystemShell, package: &str, permission: &str) -> Result<bool> {
    log::debug!("[permissions] revoking {permission} from {package}");
    shell.exec("pm", &["revoke", package, permission])?;
    Ok(true)
}

/// How mobile data is toggled on this platform. Chosen once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsmStrategy {
    /// `svc data enable|disable`.
    Svc,
    /// `global/mobile_data`.
    GlobalSetting,
    /// No way to toggle mobile data.
    Unsupported,
}

impl GsmStrategy {
    /// Strategy for `platform`.
    pub fn for_platform(platform: PlatformVersion) -> Self {
        if platform.has_svc_data() {
            Self::Svc
        } else if platform.0 >= MOBILE_DATA_SETTING_MIN_LEVEL {
            Self::GlobalSetting
        } else {
            Self::Unsupported
        }
    }

    /// Turn mobile data on or off.
    pub fn apply(self, shell: &dyn SystemShell, settings: &dyn SettingsAccessor, enabled: bool) -> Result<bool> {
        match self {
            Self::Svc => {
                shell.exec("svc", &["data", on_off(enabled)])?;
                Ok(true)
            }
            Self::GlobalSetting => settings.put_int(Namespace::Global, keys::MOBILE_DATA, i32::from(enabled)),
            Self::Unsupported => Err(ButlerError::Validation(
                "mobile data cannot be toggled on this platform".to_string(),
            )),
        }
    }
}
