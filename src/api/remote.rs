//! Typed proxy over a capability handle.

use super::{ButlerApi, LocationMode, Operation, Rotation};
use crate::error::{ButlerError, Result};
use crate::rpc::{Call, Reply, Transact, TERMINATE_CODE};

/// Forwards every [`ButlerApi`] call to the privileged peer.
///
/// Generic over the [`Transact`] seam so tests can substitute a counting
/// transport for the socket.
#[derive(Debug)]
pub struct RemoteButler<T: Transact> {
    transport: T,
}

impl<T: Transact> RemoteButler<T> {
    /// Proxy sending through `transport`.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Ask the peer to restore its snapshot and exit.
    pub fn terminate(&self) -> Result<()> {
        match self.transport.transact(TERMINATE_CODE, None)? {
            Reply::Ok { .. } => Ok(()),
            Reply::Error { operation, message } => Err(ButlerError::remote(operation, message)),
            Reply::Denied { reason } => Err(ButlerError::remote("terminate", reason)),
        }
    }

    fn call(&self, call: Call) -> Result<bool> {
        let operation = call.operation();
        log::debug!("[remote] {operation}");
        match self.transport.transact(operation.code(), Some(call))? {
            Reply::Ok { value } => Ok(value),
            Reply::Error { operation, message } => Err(ButlerError::remote(operation, message)),
            Reply::Denied { reason } => Err(ButlerError::remote(operation.name(), reason)),
        }
    }
}

impl<T: Transact> ButlerApi for RemoteButler<T> {
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetWifiEnabled { enabled })
    }

    fn set_location_mode(&self, mode: LocationMode) -> Result<bool> {
        self.call(Call::SetLocationMode { mode })
    }

    fn set_rotation(&self, rotation: Rotation) -> Result<bool> {
        self.call(Call::SetRotation { rotation })
    }

    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetGsmDataEnabled { enabled })
    }

    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool> {
        self.call(Call::GrantPermission {
            package: package.to_string(),
            permission: permission.to_string(),
        })
    }

    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool> {
        self.call(Call::RevokePermission {
            package: package.to_string(),
            permission: permission.to_string(),
        })
    }

    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetSpellCheckerEnabled { enabled })
    }

    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetShowImeWithHardKeyboard { enabled })
    }

    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetImmersiveModeConfirmation { enabled })
    }

    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetAlwaysFinishActivities { enabled })
    }

    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool> {
        self.call(Call::SetAccessibilityServiceEnabled { enabled })
    }

    fn supports(&self, _op: Operation) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::CountingTransact;
    use std::sync::Arc;

    #[test]
    fn test_call_sends_operation_code() {
        let transport = Arc::new(CountingTransact::replying(Reply::Ok { value: true }));
        let remote = RemoteButler::new(Arc::clone(&transport));
        assert!(remote.set_location_mode(LocationMode::SensorsOnly).unwrap());
        assert_eq!(transport.count(), 1);
        assert_eq!(
            transport.last(),
            Some((2, Some(Call::SetLocationMode { mode: LocationMode::SensorsOnly })))
        );
    }

    #[test]
    fn test_error_reply_becomes_remote_error() {
        let transport = CountingTransact::replying(Reply::Error {
            operation: "setGsmState".into(),
            message: "svc data: permission denial".into(),
        });
        let remote = RemoteButler::new(transport);
        match remote.set_gsm_data_enabled(true).unwrap_err() {
            ButlerError::Remote { operation, message } => {
                assert_eq!(operation, "setGsmState");
                assert!(message.contains("permission denial"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_false_reply_is_not_an_error() {
        let remote = RemoteButler::new(CountingTransact::replying(Reply::Ok { value: false }));
        assert!(!remote.set_accessibility_service_enabled(true).unwrap());
    }

    #[test]
    fn test_terminate_uses_reserved_code() {
        let transport = Arc::new(CountingTransact::replying(Reply::Ok { value: true }));
        RemoteButler::new(Arc::clone(&transport)).terminate().unwrap();
        assert_eq!(transport.last(), Some((TERMINATE_CODE, None)));
    }
}
