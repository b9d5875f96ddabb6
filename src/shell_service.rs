//! The privileged peer: `butler shell-service`.
//!
//! Launched over `adb shell` by [`crate::bootstrap`]. It saves the device
//! settings, serves [`ButlerApi`] calls on a fresh capability socket,
//! announces the handle to `$BUTLER_ANNOUNCE`, and then parks on a stop
//! latch until the terminate opcode (or SIGINT/SIGTERM) arrives. Settings
//! are restored on the way out, on every exit path after they were saved.

use std::path::Path;
use std::sync::{mpsc, Arc};

use anyhow::{Context, Result};

use crate::api::ButlerApi;
use crate::butler::accessibility::AccessibilityToggle;
use crate::butler::LocalButler;
use crate::config::Config;
use crate::constants::ANNOUNCE_ENV;
use crate::rpc::{announce, CapabilityServer};
use crate::settings::{CommandSettings, SettingsAccessor, SettingsStore};
use crate::shell::{CommandShell, SystemShell};

/// Build the peer's butler from configuration.
///
/// Settings go to `settings_file` when configured, otherwise to the
/// platform `settings` tool.
pub fn build_butler(config: &Config) -> Result<LocalButler> {
    let shell: Arc<dyn SystemShell> = Arc::new(CommandShell);
    let settings: Arc<dyn SettingsAccessor> = match &config.settings_file {
        Some(path) => Arc::new(
            SettingsStore::open(path)
                .with_context(|| format!("open settings file {}", path.display()))?,
        ),
        None => Arc::new(CommandSettings::new(Arc::clone(&shell))),
    };
    let accessibility = AccessibilityToggle::new(config.accessibility_service.clone())
        .with_timeout(config.accessibility_timeout());
    let platform = config.platform_for(shell.as_ref());
    Ok(LocalButler::new(settings, shell, platform).with_accessibility(accessibility))
}

/// Run the peer until it is told to stop.
pub fn run(config: &Config) -> Result<()> {
    let announce_to = std::env::var(ANNOUNCE_ENV)
        .with_context(|| format!("{ANNOUNCE_ENV} is not set; shell-service must be launched by a butler client"))?;

    // SAFETY: geteuid takes no arguments, touches no memory and cannot fail.
    let uid = unsafe { libc::geteuid() };
    log::info!("[shell-service] starting as uid {uid} (pid {})", std::process::id());

    let butler = Arc::new(build_butler(config)?);
    butler.on_create();
    let restore = scopeguard::guard(Arc::clone(&butler), |butler| {
        let report = butler.on_destroy();
        for (setting, error) in &report.failures {
            log::error!("[shell-service] could not restore {setting:?}: {error}");
        }
    });

    let (stop_tx, stop_rx) = mpsc::channel();
    let signal_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    }) {
        log::warn!("[shell-service] could not install signal handler: {e}");
    }

    let server = CapabilityServer::start(&config.runtime_dir, Arc::clone(&butler) as Arc<dyn ButlerApi>, stop_tx)
        .context("start capability server")?;
    announce(Path::new(&announce_to), server.handle())
        .with_context(|| format!("announce handle to {announce_to}"))?;
    log::info!("[shell-service] ready, announced to {announce_to}");

    if stop_rx.recv().is_err() {
        log::warn!("[shell-service] stop latch closed without a signal");
    }
    log::info!("[shell-service] stopping");
    server.shutdown();
    drop(restore);
    log::info!("[shell-service] exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LocationMode, PlatformVersion};
    use crate::settings::{keys, Namespace};

    #[test]
    fn test_build_butler_uses_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"secure": {"location_mode": "1"}}"#).unwrap();
        let config = Config {
            settings_file: Some(path.clone()),
            platform_level: Some(29),
            ..Config::default()
        };

        let butler = build_butler(&config).unwrap();
        assert_eq!(butler.platform(), PlatformVersion(29));
        butler.set_location_mode(LocationMode::HighAccuracy).unwrap();

        let tables = SettingsStore::load_file(&path).unwrap();
        assert_eq!(tables[&Namespace::Secure][keys::LOCATION_MODE], "3");
    }

    #[test]
    fn test_build_butler_rejects_corrupt_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = Config {
            settings_file: Some(path),
            ..Config::default()
        };
        assert!(build_butler(&config).is_err());
    }
}
