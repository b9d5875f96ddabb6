//! Save, override and restore of the settings a session touches.
//!
//! `begin` captures a [`SettingSnapshot`], writes the test baseline and hides
//! error dialogs. `restore` undoes all of that in [`RESTORE_ORDER`]. Each
//! step is independent: a failure is logged and reported, and the remaining
//! steps still run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::PlatformVersion;
use crate::butler::animations::{self, AnimationScales};
use crate::butler::dialogs::DialogSuppressor;
use crate::butler::location::{self, LocationState, LocationStrategy};
use crate::butler::rotation::{self, RotationState};
use crate::butler::toggles::Toggle;
use crate::error::Result;
use crate::settings::SettingsAccessor;

/// A setting group the guardian saves and restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedSetting {
    /// Error-dialog suppression.
    DialogSuppressor,
    /// The three animation scales.
    Animations,
    /// Location mode or providers.
    Location,
    /// Accelerometer and user rotation.
    Rotation,
    /// Spell checker.
    SpellChecker,
    /// Soft keyboard with hardware keyboard.
    ShowImeWithHardKeyboard,
    /// Immersive-mode confirmation.
    ImmersiveModeConfirmation,
    /// "Don't keep activities".
    AlwaysFinishActivities,
    /// The butler accessibility service, when the session enabled it.
    AccessibilityService,
}

/// Order settings are written back in, after the dialog suppressor is removed.
pub const RESTORE_ORDER: [ManagedSetting; 7] = [
    ManagedSetting::Animations,
    ManagedSetting::Location,
    ManagedSetting::Rotation,
    ManagedSetting::SpellChecker,
    ManagedSetting::ShowImeWithHardKeyboard,
    ManagedSetting::ImmersiveModeConfirmation,
    ManagedSetting::AlwaysFinishActivities,
];

/// Pre-session values of every managed setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingSnapshot {
    /// Raw animation scale strings.
    pub animation_scales: AnimationScales,
    /// Location mode or allowed providers.
    pub location: LocationState,
    /// Accelerometer and user rotation.
    pub rotation: RotationState,
    /// Spell checker on.
    pub spell_checker: bool,
    /// Soft keyboard shown with a hardware keyboard.
    pub show_ime: bool,
    /// Immersive-mode confirmation shown.
    pub immersive_confirmation: bool,
    /// "Don't keep activities" on.
    pub always_finish_activities: bool,
}

/// Outcome of a restore: every step that failed, in the order attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Failed steps with their error text.
    pub failures: Vec<(ManagedSetting, String)>,
}

impl RestoreReport {
    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, setting: ManagedSetting, result: Result<()>) {
        if let Err(e) = result {
            log::error!("[guardian] restoring {setting:?} failed: {e}");
            self.failures.push((setting, e.to_string()));
        }
    }
}

/// Owns the snapshot for one session.
pub struct StateGuardian {
    settings: Arc<dyn SettingsAccessor>,
    platform: PlatformVersion,
    location: LocationStrategy,
    snapshot: Option<SettingSnapshot>,
    suppressor: Option<DialogSuppressor>,
}

impl std::fmt::Debug for StateGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGuardian")
            .field("platform", &self.platform)
            .field("snapshot", &self.snapshot)
            .field("suppressor", &self.suppressor)
            .finish_non_exhaustive()
    }
}

impl StateGuardian {
    /// Guardian over `settings` on `platform`.
    pub fn new(settings: Arc<dyn SettingsAccessor>, platform: PlatformVersion) -> Self {
        Self {
            settings,
            platform,
            location: LocationStrategy::for_platform(platform),
            snapshot: None,
            suppressor: None,
        }
    }

    /// Read every managed setting. Unreadable values fall back to safe defaults.
    pub fn capture(&self) -> SettingSnapshot {
        let settings = self.settings.as_ref();
        SettingSnapshot {
            animation_scales: animations::save(settings),
            location: self.location.save(settings),
            rotation: rotation::save(settings),
            spell_checker: Toggle::SpellChecker.read_or_off(settings, self.platform),
            show_ime: Toggle::ShowImeWithHardKeyboard.read_or_off(settings, self.platform),
            immersive_confirmation: Toggle::ImmersiveModeConfirmation.read_or_off(settings, self.platform),
            always_finish_activities: Toggle::AlwaysFinishActivities.read_or_off(settings, self.platform),
        }
    }

    /// Snapshot taken by [`Self::begin`], if any.
    pub fn snapshot(&self) -> Option<&SettingSnapshot> {
        self.snapshot.as_ref()
    }

    /// Save everything, then apply the test baseline.
    ///
    /// A second call keeps the first snapshot.
    pub fn begin(&mut self) {
        if self.snapshot.is_some() {
            log::warn!("[guardian] begin called twice, keeping the first snapshot");
            return;
        }
        let snapshot = self.capture();
        log::info!("[guardian] saved device settings: {snapshot:?}");
        self.snapshot = Some(snapshot);

        let settings = self.settings.as_ref();
        let platform = self.platform;
        let steps: [(&str, Result<()>); 4] = [
            ("animations", animations::set_all(settings, "0")),
            ("rotation", rotation::apply_baseline(settings)),
            (
                "spell checker",
                Toggle::SpellChecker.write(settings, platform, false).map(drop),
            ),
            (
                "show ime",
                Toggle::ShowImeWithHardKeyboard.write(settings, platform, false).map(drop),
            ),
        ];
        for (name, result) in steps {
            if let Err(e) = result {
                log::warn!("[guardian] applying {name} baseline failed: {e}");
            }
        }

        match DialogSuppressor::install(settings) {
            Ok(suppressor) => self.suppressor = Some(suppressor),
            Err(e) => log::warn!("[guardian] installing dialog suppressor failed: {e}"),
        }
    }

    /// Undo [`Self::begin`]. Every step is attempted.
    pub fn restore(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let settings = self.settings.as_ref();

        if let Some(suppressor) = self.suppressor.take() {
            report.record(ManagedSetting::DialogSuppressor, suppressor.uninstall(settings));
        }

        let Some(snapshot) = self.snapshot.take() else {
            log::debug!("[guardian] nothing to restore");
            return report;
        };

        for setting in RESTORE_ORDER {
            let result = self.restore_one(settings, &snapshot, setting);
            report.record(setting, result);
        }

        if report.is_clean() {
            log::info!("[guardian] device settings restored");
        }
        report
    }

    fn restore_one(
        &self,
        settings: &dyn SettingsAccessor,
        snapshot: &SettingSnapshot,
        setting: ManagedSetting,
    ) -> Result<()> {
        let toggle = |toggle: Toggle, enabled: bool| toggle.write(settings, self.platform, enabled).map(drop);
        match setting {
            ManagedSetting::DialogSuppressor | ManagedSetting::AccessibilityService => Ok(()),
            ManagedSetting::Animations => animations::restore(settings, &snapshot.animation_scales),
            ManagedSetting::Location => location::restore(settings, &snapshot.location).map(drop),
            ManagedSetting::Rotation => rotation::restore(settings, snapshot.rotation),
            ManagedSetting::SpellChecker => toggle(Toggle::SpellChecker, snapshot.spell_checker),
            ManagedSetting::ShowImeWithHardKeyboard => toggle(Toggle::ShowImeWithHardKeyboard, snapshot.show_ime),
            ManagedSetting::ImmersiveModeConfirmation => {
                toggle(Toggle::ImmersiveModeConfirmation, snapshot.immersive_confirmation)
            }
            ManagedSetting::AlwaysFinishActivities => {
                toggle(Toggle::AlwaysFinishActivities, snapshot.always_finish_activities)
            }
        }
    }
}
