//! The butler that actually changes device state.
//!
//! [`LocalButler`] implements [`ButlerApi`] on top of a [`SettingsAccessor`]
//! and a [`SystemShell`]. The privileged peer runs one over the platform
//! tools and serves it through [`crate::rpc::CapabilityServer`]; the client
//! keeps another over `adb shell` as the fallback for operations that do not
//! need privilege.
//!
//! Each submodule is one setting changer:
//!
//! - [`rotation`] - user rotation and the accelerometer lock
//! - [`location`] - location mode, or allowed providers on old platforms
//! - [`toggles`] - spell checker, IME, immersive hint, always-finish
//! - [`animations`] - the three animation scales
//! - [`dialogs`] - crash/ANR dialog suppression
//! - [`accessibility`] - the butler accessibility service
//! - [`system`] - wifi, mobile data and runtime permissions

pub mod accessibility;
pub mod animations;
pub mod dialogs;
pub mod location;
pub mod rotation;
pub mod system;
pub mod toggles;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::{ButlerApi, LocationMode, Operation, PlatformVersion, Rotation};
use crate::error::Result;
use crate::guardian::{ManagedSetting, RestoreReport, SettingSnapshot, StateGuardian};
use crate::settings::{Namespace, SettingsAccessor};
use crate::shell::SystemShell;

use self::accessibility::AccessibilityToggle;
use self::location::LocationStrategy;
use self::system::GsmStrategy;
use self::toggles::Toggle;

/// Integer value of `key`, or `default` (with a warning) when unreadable.
pub(crate) fn read_int_or(settings: &dyn SettingsAccessor, namespace: Namespace, key: &str, default: i32) -> i32 {
    settings.get_int(namespace, key).unwrap_or_else(|e| {
        log::warn!("[butler] reading {namespace}/{key} failed, assuming {default}: {e}");
        default
    })
}

/// Device-state changer with session save/restore.
pub struct LocalButler {
    settings: Arc<dyn SettingsAccessor>,
    shell: Arc<dyn SystemShell>,
    platform: PlatformVersion,
    location: LocationStrategy,
    gsm: GsmStrategy,
    accessibility: AccessibilityToggle,
    /// Set while the service is on because this session turned it on.
    accessibility_enabled: AtomicBool,
    guardian: Mutex<StateGuardian>,
}

impl std::fmt::Debug for LocalButler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalButler")
            .field("platform", &self.platform)
            .field("location", &self.location)
            .field("gsm", &self.gsm)
            .field("accessibility", &self.accessibility)
            .finish_non_exhaustive()
    }
}

impl LocalButler {
    /// Butler over `settings` and `shell` for `platform`.
    ///
    /// The accessibility service is unconfigured until
    /// [`Self::with_accessibility`] is called.
    pub fn new(settings: Arc<dyn SettingsAccessor>, shell: Arc<dyn SystemShell>, platform: PlatformVersion) -> Self {
        let guardian = StateGuardian::new(Arc::clone(&settings), platform);
        Self {
            settings,
            shell,
            platform,
            location: LocationStrategy::for_platform(platform),
            gsm: GsmStrategy::for_platform(platform),
            accessibility: AccessibilityToggle::new(""),
            accessibility_enabled: AtomicBool::new(false),
            guardian: Mutex::new(guardian),
        }
    }

    /// Use `toggle` for the accessibility operation.
    pub fn with_accessibility(mut self, toggle: AccessibilityToggle) -> Self {
        self.accessibility = toggle;
        self
    }

    /// Platform this butler was built for.
    pub fn platform(&self) -> PlatformVersion {
        self.platform
    }

    /// Save device settings and apply the test baseline.
    pub fn on_create(&self) {
        log::info!("[butler] starting session on platform {}", self.platform.0);
        self.guardian().begin();
    }

    /// Restore everything saved by [`Self::on_create`], and turn the
    /// accessibility service back off if this session turned it on.
    pub fn on_destroy(&self) -> RestoreReport {
        let mut report = self.guardian().restore();
        if self.accessibility_enabled.swap(false, Ordering::SeqCst) {
            let result = self
                .accessibility
                .set(self.settings.as_ref(), self.shell.as_ref(), false)
                .map(drop);
            report.record(ManagedSetting::AccessibilityService, result);
        }
        log::info!(
            "[butler] session ended ({} restore failure(s))",
            report.failures.len()
        );
        report
    }

    /// Snapshot taken by [`Self::on_create`], if any.
    pub fn snapshot(&self) -> Option<SettingSnapshot> {
        self.guardian().snapshot().cloned()
    }

    fn guardian(&self) -> MutexGuard<'_, StateGuardian> {
        self.guardian.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn toggle(&self, toggle: Toggle, enabled: bool) -> Result<bool> {
        toggle.write(self.settings.as_ref(), self.platform, enabled)
    }
}

impl ButlerApi for LocalButler {
    fn set_wifi_enabled(&self, enabled: bool) -> Result<bool> {
        system::set_wifi(self.shell.as_ref(), enabled)
    }

    fn set_location_mode(&self, mode: LocationMode) -> Result<bool> {
        self.location.apply(self.settings.as_ref(), mode)
    }

    fn set_rotation(&self, rotation: Rotation) -> Result<bool> {
        rotation::set(self.settings.as_ref(), rotation)
    }

    fn set_gsm_data_enabled(&self, enabled: bool) -> Result<bool> {
        self.gsm.apply(self.shell.as_ref(), self.settings.as_ref(), enabled)
    }

    fn grant_permission(&self, package: &str, permission: &str) -> Result<bool> {
        system::grant_permission(self.shell.as_ref(), package, permission)
    }

    fn revoke_permission(&self, package: &str, permission: &str) -> Result<bool> {
        system::revoke_permission(self.shell.as_ref(), package, permission)
    }

    fn set_spell_checker_enabled(&self, enabled: bool) -> Result<bool> {
        self.toggle(Toggle::SpellChecker, enabled)
    }

    fn set_show_ime_with_hard_keyboard(&self, enabled: bool) -> Result<bool> {
        self.toggle(Toggle::ShowImeWithHardKeyboard, enabled)
    }

    fn set_immersive_mode_confirmation(&self, enabled: bool) -> Result<bool> {
        self.toggle(Toggle::ImmersiveModeConfirmation, enabled)
    }

    fn set_always_finish_activities(&self, enabled: bool) -> Result<bool> {
        self.toggle(Toggle::AlwaysFinishActivities, enabled)
    }

    fn set_accessibility_service_enabled(&self, enabled: bool) -> Result<bool> {
        let changed = self
            .accessibility
            .set(self.settings.as_ref(), self.shell.as_ref(), enabled)?;
        if changed {
            self.accessibility_enabled.store(enabled, Ordering::SeqCst);
        }
        Ok(changed)
    }

    fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::SetGsmDataEnabled => self.gsm != GsmStrategy::Unsupported,
            Operation::SetAccessibilityServiceEnabled => self.accessibility.is_configured(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{keys, SettingsStore};
    use crate::shell::tests::RecordingShell;

    fn butler(level: u32) -> (Arc<SettingsStore>, Arc<RecordingShell>, LocalButler) {
        let store = Arc::new(SettingsStore::in_memory());
        let shell = Arc::new(RecordingShell::default());
        let butler = LocalButler::new(
            Arc::clone(&store) as Arc<dyn SettingsAccessor>,
            Arc::clone(&shell) as Arc<dyn SystemShell>,
            PlatformVersion(level),
        );
        (store, shell, butler)
    }

    #[test]
    fn test_operations_reach_settings_and_tools() {
        let (store, shell, butler) = butler(30);
        assert!(butler.set_location_mode(LocationMode::SensorsOnly).unwrap());
        assert!(butler.set_rotation(Rotation::Rotation180).unwrap());
        assert!(butler.set_always_finish_activities(true).unwrap());
        assert!(butler.set_wifi_enabled(true).unwrap());
        assert!(butler.set_gsm_data_enabled(false).unwrap());

        assert_eq!(store.get_int(Namespace::Secure, keys::LOCATION_MODE).unwrap(), 1);
        assert_eq!(store.get_int(Namespace::System, keys::USER_ROTATION).unwrap(), 2);
        assert_eq!(store.get_int(Namespace::Global, keys::ALWAYS_FINISH_ACTIVITIES).unwrap(), 1);
        assert_eq!(shell.calls(), vec!["svc wifi enable", "svc data disable"]);
    }

    #[test]
    fn test_supports_reflects_platform_and_config() {
        let (_, _, old) = butler(18);
        assert!(!old.supports(Operation::SetGsmDataEnabled));
        assert!(!old.supports(Operation::SetAccessibilityServiceEnabled));
        assert!(old.supports(Operation::SetRotation));

        let (_, _, configured) = butler(30);
        let configured = configured.with_accessibility(AccessibilityToggle::new("a/.B"));
        assert!(configured.supports(Operation::SetAccessibilityServiceEnabled));
    }

    #[test]
    fn test_on_create_then_on_destroy_round_trips() {
        let (store, _, butler) = butler(30);
        store.put_int(Namespace::System, keys::USER_ROTATION, 1).unwrap();
        store.put_int(Namespace::Secure, keys::LOCATION_MODE, 2).unwrap();

        butler.on_create();
        assert!(butler.snapshot().is_some());
        butler.set_location_mode(LocationMode::Off).unwrap();
        butler.set_rotation(Rotation::Rotation270).unwrap();

        assert!(butler.on_destroy().is_clean());
        assert_eq!(store.get_int(Namespace::System, keys::USER_ROTATION).unwrap(), 1);
        assert_eq!(store.get_int(Namespace::Secure, keys::LOCATION_MODE).unwrap(), 2);
        assert!(butler.snapshot().is_none());
    }

    fn accessible_butler() -> (Arc<SettingsStore>, Arc<RecordingShell>, LocalButler) {
        let (store, shell, butler) = butler(30);
        let toggle = AccessibilityToggle::new("com.butler/.Svc")
            .with_timeout(std::time::Duration::from_millis(50))
            .with_poll_interval(std::time::Duration::from_millis(5));
        (store, shell, butler.with_accessibility(toggle))
    }

    fn enabled_services(store: &SettingsStore) -> Option<String> {
        store
            .get_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES)
            .unwrap()
    }

    #[test]
    fn test_on_destroy_disables_accessibility_it_enabled() {
        let (store, shell, butler) = accessible_butler();
        store
            .put_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES, "other/.Svc")
            .unwrap();
        butler.on_create();
        shell.reply(Ok("Bound services:{com.butler/.Svc}".into()));
        assert!(butler.set_accessibility_service_enabled(true).unwrap());
        assert_eq!(
            enabled_services(&store).as_deref(),
            Some("other/.Svc:com.butler/.Svc")
        );

        shell.reply(Ok("Bound services:{}".into()));
        assert!(butler.on_destroy().is_clean());
        assert_eq!(enabled_services(&store).as_deref(), Some("other/.Svc"));
    }

    #[test]
    fn test_on_destroy_leaves_preexisting_accessibility_alone() {
        let (store, shell, butler) = accessible_butler();
        store
            .put_string(Namespace::Secure, keys::ENABLED_ACCESSIBILITY_SERVICES, "com.butler/.Svc")
            .unwrap();
        butler.on_create();
        assert!(!butler.set_accessibility_service_enabled(true).unwrap());

        assert!(butler.on_destroy().is_clean());
        assert_eq!(enabled_services(&store).as_deref(), Some("com.butler/.Svc"));
        assert!(shell.calls().is_empty());
    }

    #[test]
    fn test_on_destroy_reports_accessibility_that_will_not_stop() {
        let (_, shell, butler) = accessible_butler();
        butler.on_create();
        shell.reply(Ok("Bound services:{com.butler/.Svc}".into()));
        butler.set_accessibility_service_enabled(true).unwrap();

        // dumpsys keeps listing the service until the wait gives up.
        for _ in 0..64 {
            shell.reply(Ok("Bound services:{com.butler/.Svc}".into()));
        }
        let report = butler.on_destroy();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, ManagedSetting::AccessibilityService);
    }
}
