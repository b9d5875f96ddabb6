//! The facade test code calls.

use std::collections::BTreeMap;

use super::{ButlerApi, LocationMode, Operation, PlatformVersion, Rotation};
use crate::error::{ButlerError, Result};

/// Where an operation is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Through the privileged peer.
    Privileged,
    /// To the in-process fallback.
    Local,
    /// Nowhere; the call answers `false`.
    Unavailable,
}

/// Per-operation routing, decided once when the client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<Operation, Route>,
}

impl RoutingTable {
    /// Compute the route of every operation.
    ///
    /// Wifi goes to the fallback on platforms where it does not need
    /// privilege; everything else prefers the privileged peer. A preferred
    /// backend that is missing (or does not support the operation) falls
    /// over to the other one.
    pub fn resolve(
        platform: PlatformVersion,
        privileged_available: bool,
        fallback: Option<&dyn ButlerApi>,
    ) -> Self {
        let local_ok = |op: Operation| fallback.is_some_and(|api| api.supports(op));
        let routes = Operation::ALL
            .into_iter()
            .map(|op| {
                let prefer_local = op == Operation::SetWifiEnabled && !platform.wifi_needs_privilege();
                let route = match (prefer_local, privileged_available, local_ok(op)) {
                    (true, _, true) => Route::Local,
                    (true, true, false) => Route::Privileged,
                    (false, true, _) => Route::Privileged,
                    (false, false, true) => Route::Local,
                    (_, false, false) => Route::Unavailable,
                };
                (op, route)
            })
            .collect();
        Self { routes }
    }

    /// Route for `op`.
    pub fn route(&self, op: Operation) -> Route {
        self.routes.get(&op).copied().unwrap_or(Route::Unavailable)
    }
}

/// Entry point for test code.
///
/// Holds the privileged backend (normally a [`super::RemoteButler`]) and an
/// optional local fallback, and sends each call where the [`RoutingTable`]
/// says. Calls routed nowhere log a warning and answer `Ok(false)`.
pub struct ButlerClient {
    privileged: Option<Box<dyn ButlerApi>>,
    fallback: Option<Box<dyn ButlerApi>>,
    routes: RoutingTable,
}

impl std::fmt::Debug for ButlerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ButlerClient")
            .field("privileged", &self.privileged.is_some())
            .field("fallback", &self.fallback.is_some())
            .field("routes", &self.routes)
            .finish()
    }
}

impl ButlerClient {
    /// Build the facade and fix its routes for `platform`.
    pub fn new(
        platform: PlatformVersion,
        privileged: Option<Box<dyn ButlerApi>>,
        fallback: Option<Box<dyn ButlerApi>>,
    ) -> Self {
        let routes = RoutingTable::resolve(platform, privileged.is_some(), fallback.as_deref());
        log::debug!("[client] routes for platform {}: {routes:?}", platform.0);
        Self {
            privileged,
            fallback,
            routes,
        }
    }

    /// Whether calls can reach the privileged peer.
    pub fn is_privileged(&self) -> bool {
        self.privileged.is_some()
    }

    /// The fixed routing table.
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Set the rotation from its platform value (0..=3).
    pub fn set_rotation_value(&self, value: i32) -> Result<bool> {
        self.set_rotation(Rotation::try_from(value)?)
    }

    /// Set the location mode from its platform value (0..=3).
    pub fn set_location_mode_value(&self, value: i32) -> Result<bool> {
        self.set_location_mode(LocationMode::try_from(value)?)
    }

    fn backend(&self, op: Operation) -> Option<&dyn ButlerApi> {
        match self.routes.route(op) {
            Route::Privileged => self.privileged.as_deref(),
            Route::Local => self.fallback.as_deref(),
            Route::Unavailable => None,
        }
    }

    fn dispatch(&self, op: Operation, f: impl FnOnce(&dyn ButlerApi) -> Result<bool>) -> Result<bool> {
        match self.backend(op) {
            Some(api) => f(api),
            None => {
                log::warn!("[client] {op} is unavailable on this device");
                Ok(false)
            }
        }
    }
}

fn require_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(ButlerError::Validation(format!("invalid {what}: {value:?}")));
    }
    Ok(())
}

impl ButlerApi for ButlerClient {
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetWifiEnabled, |api| api.set_wifi_enabled(enabled))
    }

    fn set_location_mode(&self, mode: LocationMode) -> Result<bool> {
        self.dispatch(Operation::SetLocationMode, |api| api.set_location_mode(mode))
    }

    fn set_rotation(&self, rotation: Rotation) -> Result<bool> {
        self.dispatch(Operation::SetRotation, |api| api.set_rotation(rotation))
    }

    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetGsmDataEnabled, |api| api.set_gsm_data_enabled(enabled))
    }

    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool> {
        require_identifier("package", package)?;
        require_identifier("permission", permission)?;
        self.dispatch(Operation::GrantPermission, |api| api.grant_permission(package, permission))
    }

    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool> {
        require_identifier("package", package)?;
        require_identifier("permission", permission)?;
        self.dispatch(Operation::RevokePermission, |api| api.revoke_permission(package, permission))
    }

    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetSpellCheckerEnabled, |api| {
            api.set_spell_checker_enabled(enabled)
        })
    }

    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetShowImeWithHardKeyboard, |api| {
            api.set_show_ime_with_hard_keyboard(enabled)
        })
    }

    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetImmersiveModeConfirmation, |api| {
            api.set_immersive_mode_confirmation(enabled)
        })
    }

    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetAlwaysFinishActivities, |api| {
            api.set_always_finish_activities(enabled)
        })
    }

    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool> {
        self.dispatch(Operation::SetAccessibilityServiceEnabled, |api| {
            api.set_accessibility_service_enabled(enabled)
        })
    }

    fn supports(&self, op: Operation) -> bool {
        self.routes.route(op) != Route::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{CountingTransact, ScriptedButler};
    use crate::api::RemoteButler;
    use crate::rpc::{Call, Reply};
    use std::sync::Arc;

    fn remote(transport: &Arc<CountingTransact>) -> Option<Box<dyn ButlerApi>> {
        Some(Box::new(RemoteButler::new(Arc::clone(transport))))
    }

    #[test]
    fn test_invalid_values_never_reach_the_transport() {
        let transport = Arc::new(CountingTransact::replying(Reply::Ok { value: true }));
        let client = ButlerClient::new(PlatformVersion(30), remote(&transport), None);

        assert!(matches!(client.set_rotation_value(4), Err(ButlerError::Validation(_))));
        assert!(matches!(client.set_location_mode_value(-1), Err(ButlerError::Validation(_))));
        assert!(matches!(
            client.grant_permission("", "android.permission.CAMERA"),
            Err(ButlerError::Validation(_))
        ));
        assert_eq!(transport.count(), 0);

        assert!(client.set_rotation_value(1).unwrap());
        assert_eq!(transport.count(), 1);
    }

    #[test]
    fn test_wifi_routes_locally_on_old_platforms() {
        let transport = Arc::new(CountingTransact::replying(Reply::Ok { value: true }));
        let fallback = Arc::new(ScriptedButler::new());
        let client = ButlerClient::new(
            PlatformVersion(26),
            remote(&transport),
            Some(Box::new(Arc::clone(&fallback))),
        );
        assert_eq!(client.routes().route(Operation::SetWifiEnabled), Route::Local);
        assert_eq!(client.routes().route(Operation::SetRotation), Route::Privileged);

        client.set_wifi_enabled(false).unwrap();
        assert_eq!(fallback.calls(), vec![Call::SetWifiEnabled { enabled: false }]);
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn test_wifi_needs_privilege_on_new_platforms() {
        let transport = Arc::new(CountingTransact::replying(Reply::Ok { value: true }));
        let client = ButlerClient::new(
            PlatformVersion(27),
            remote(&transport),
            Some(Box::new(ScriptedButler::new())),
        );
        assert_eq!(client.routes().route(Operation::SetWifiEnabled), Route::Privileged);
        client.set_wifi_enabled(true).unwrap();
        assert_eq!(transport.count(), 1);
    }

    #[test]
    fn test_without_peer_falls_back_or_is_unavailable() {
        let fallback = ScriptedButler::new().without(Operation::SetAccessibilityServiceEnabled);
        let client = ButlerClient::new(PlatformVersion(30), None, Some(Box::new(fallback)));
        assert!(!client.is_privileged());
        assert_eq!(client.routes().route(Operation::SetLocationMode), Route::Local);
        assert_eq!(
            client.routes().route(Operation::SetAccessibilityServiceEnabled),
            Route::Unavailable
        );
        assert!(!client.set_accessibility_service_enabled(true).unwrap());
        assert!(client.set_location_mode(LocationMode::Off).unwrap());
    }

    #[test]
    fn test_nothing_bound_answers_false() {
        let client = ButlerClient::new(PlatformVersion(30), None, None);
        for op in Operation::ALL {
            assert_eq!(client.routes().route(op), Route::Unavailable);
            assert!(!client.supports(op));
        }
        assert!(!client.set_rotation(Rotation::Rotation0).unwrap());
    }
}
