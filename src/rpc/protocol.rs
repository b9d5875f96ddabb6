//! Messages exchanged over the capability socket.
//!
//! ```text
//! client ── Transaction { code: 2, token, call: set_location_mode{mode: 3} } ──► peer
//!        ◄─ Reply::Ok { value: true } ──────────────────────────────────────────
//!
//! client ── Transaction { code: TERMINATE_CODE, token } ──► peer
//!        ◄─ Reply::Ok { value: true } ── peer restores settings and exits
//! ```

use serde::{Deserialize, Serialize};

use super::handle::CapabilityHandle;
use crate::api::{ButlerApi, LocationMode, Operation, Rotation};
use crate::constants::{BROADCAST_BUTLER_API_ACTION, BUTLER_API_BUNDLE_KEY};
use crate::error::Result;

/// Reserved transaction code that tells the peer to shut down.
///
/// Sits at the top of the user transaction range so it can never collide
/// with a declared operation.
pub const TERMINATE_CODE: u32 = 0x00ff_ffff;

/// Arguments of one operation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(missing_docs, reason = "fields mirror the ButlerApi parameters")]
pub enum Call {
    SetWifiEnabled { enabled: bool },
    SetLocationMode { mode: LocationMode },
    SetRotation { rotation: Rotation },
    SetGsmDataEnabled { enabled: bool },
    GrantPermission { package: String, permission: String },
    SetSpellCheckerEnabled { enabled: bool },
    SetShowImeWithHardKeyboard { enabled: bool },
    SetImmersiveModeConfirmation { enabled: bool },
    SetAlwaysFinishActivities { enabled: bool },
    SetAccessibilityServiceEnabled { enabled: bool },
    RevokePermission { package: String, permission: String },
}

impl Call {
    /// Operation this call invokes.
    pub fn operation(&self) -> Operation {
        match self {
            Self::SetWifiEnabled { .. } => Operation::SetWifiEnabled,
            Self::SetLocationMode { .. } => Operation::SetLocationMode,
            Self::SetRotation { .. } => Operation::SetRotation,
            Self::SetGsmDataEnabled { .. } => Operation::SetGsmDataEnabled,
            Self::GrantPermission { .. } => Operation::GrantPermission,
            Self::SetSpellCheckerEnabled { .. } => Operation::SetSpellCheckerEnabled,
            Self::SetShowImeWithHardKeyboard { .. } => Operation::SetShowImeWithHardKeyboard,
            Self::SetImmersiveModeConfirmation { .. } => Operation::SetImmersiveModeConfirmation,
            Self::SetAlwaysFinishActivities { .. } => Operation::SetAlwaysFinishActivities,
            Self::SetAccessibilityServiceEnabled { .. } => Operation::SetAccessibilityServiceEnabled,
            Self::RevokePermission { .. } => Operation::RevokePermission,
        }
    }

    /// Invoke the call on `api`.
    pub fn dispatch(&self, api: &dyn ButlerApi) -> Result<bool> {
        match self {
            Self::SetWifiEnabled { enabled } => api.set_wifi_enabled(*enabled),
            Self::SetLocationMode { mode } => api.set_location_mode(*mode),
            Self::SetRotation { rotation } => api.set_rotation(*rotation),
            Self::SetGsmDataEnabled { enabled } => api.set_gsm_data_enabled(*enabled),
            Self::GrantPermission { package, permission } => {
                api.grant_permission(package, permission)
            }
            Self::SetSpellCheckerEnabled { enabled } => api.set_spell_checker_enabled(*enabled),
            Self::SetShowImeWithHardKeyboard { enabled } => {
                api.set_show_ime_with_hard_keyboard(*enabled)
            }
            Self::SetImmersiveModeConfirmation { enabled } => {
                api.set_immersive_mode_confirmation(*enabled)
            }
            Self::SetAlwaysFinishActivities { enabled } => {
                api.set_always_finish_activities(*enabled)
            }
            Self::SetAccessibilityServiceEnabled { enabled } => {
                api.set_accessibility_service_enabled(*enabled)
            }
            Self::RevokePermission { package, permission } => {
                api.revoke_permission(package, permission)
            }
        }
    }
}

/// One call into the privileged peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Operation code, or [`TERMINATE_CODE`].
    pub code: u32,
    /// Capability token from the handle.
    pub token: String,
    /// Arguments; absent for terminate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<Call>,
}

/// The peer's answer to a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// The operation ran; `value` is its boolean outcome.
    Ok {
        /// Operation result.
        value: bool,
    },
    /// The operation failed on the peer.
    Error {
        /// Operation name.
        operation: String,
        /// Diagnostic descriptor of the failure.
        message: String,
    },
    /// The call was refused before dispatch (bad token).
    Denied {
        /// Why the call was refused.
        reason: String,
    },
}

/// Message the peer sends to hand its capability handle to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// Action string; the listener ignores anything but the butler action.
    pub action: String,
    /// Extras bundle; the handle lives under the `ButlerApi` key.
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Announcement {
    /// Announcement carrying `handle`.
    pub fn butler_api(handle: &CapabilityHandle) -> Result<Self> {
        let mut extras = serde_json::Map::new();
        extras.insert(BUTLER_API_BUNDLE_KEY.to_string(), serde_json::to_value(handle)?);
        Ok(Self {
            action: BROADCAST_BUTLER_API_ACTION.to_string(),
            extras,
        })
    }

    /// Whether this is a butler API announcement.
    pub fn is_butler_api(&self) -> bool {
        self.action == BROADCAST_BUTLER_API_ACTION
    }

    /// The carried handle, if present and well-formed.
    pub fn handle(&self) -> Option<CapabilityHandle> {
        let value = self.extras.get(BUTLER_API_BUNDLE_KEY)?;
        match serde_json::from_value(value.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("[announce] malformed handle in announcement: {e}");
                None
            }
        }
    }
}
