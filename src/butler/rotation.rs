//! Screen rotation lock.

use serde::{Deserialize, Serialize};

use super::read_int_or;
use crate::api::Rotation;
use crate::error::Result;
use crate::settings::{keys, Namespace, SettingsAccessor};

/// Rotation settings as found before the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    /// Raw `accelerometer_rotation` value.
    pub accelerometer: i32,
    /// Raw `user_rotation` value.
    pub user_rotation: i32,
}

/// Read the current rotation settings, substituting 0 for anything unreadable.
pub fn save(settings: &dyn SettingsAccessor) -> RotationState {
    RotationState {
        accelerometer: read_int_or(settings, Namespace::System, keys::ACCELEROMETER_ROTATION, 0),
        user_rotation: read_int_or(settings, Namespace::System, keys::USER_ROTATION, 0),
    }
}

/// Start from portrait with the accelerometer ignored.
pub fn apply_baseline(settings: &dyn SettingsAccessor) -> Result<()> {
    settings.put_int(Namespace::System, keys::USER_ROTATION, Rotation::Rotation0.value())?;
    settings.put_int(Namespace::System, keys::ACCELEROMETER_ROTATION, 0)?;
    Ok(())
}

/// Write back a saved state.
pub fn restore(settings: &dyn SettingsAccessor, state: RotationState) -> Result<()> {
    settings.put_int(Namespace::System, keys::ACCELEROMETER_ROTATION, state.accelerometer)?;
    settings.put_int(Namespace::System, keys::USER_ROTATION, state.user_rotation)?;
    Ok(())
}

/// Set the locked rotation. Only `user_rotation` is written.
pub fn set(settings: &dyn SettingsAccessor, rotation: Rotation) -> Result<bool> {
    log::debug!("[rotation] setting screen rotation to {}", rotation.value());
    settings.put_int(Namespace::System, keys::USER_ROTATION, rotation.value())
}
